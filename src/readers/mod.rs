pub mod point_reader;

pub use point_reader::PointReader;
