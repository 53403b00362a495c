pub mod driver;
pub mod fleet;
pub mod load;
pub mod match_record;
pub mod rating;
pub mod tla;
