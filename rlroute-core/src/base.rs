//! Core functionalities.
mod algo;
mod device;
mod obs;
pub use algo::Algo;
pub use device::Device;
pub use obs::Obs;
