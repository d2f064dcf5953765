pub mod aggregator;
pub mod consistency;
pub mod openai_api;
pub mod rollup;
pub mod section_g;
pub mod store;

#[cfg(test)]
pub(crate) mod test_util;
