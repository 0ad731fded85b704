pub mod angle;
pub mod line_segment;
