pub mod catalog;
pub mod criteria;

pub fn core_version() -> &'static str {
    "0.1.0"
}
