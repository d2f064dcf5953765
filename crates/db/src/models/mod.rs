pub mod activity;
pub mod business_year;
pub mod contractor;
pub mod employee;
pub mod federal_credit;
pub mod supply;
