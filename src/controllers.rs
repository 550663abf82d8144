pub mod clusters;
pub mod health;
pub mod refresh;
