pub mod detector;
pub mod screenshot;
