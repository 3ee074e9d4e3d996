pub mod channels;
pub mod posts;
