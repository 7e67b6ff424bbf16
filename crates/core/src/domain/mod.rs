pub mod demand;
pub mod price;
pub mod recommendation;
pub mod workflow;
