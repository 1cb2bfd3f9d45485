pub mod forecast;
pub mod order;
pub mod product;
pub mod recommendation;
