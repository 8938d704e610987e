mod audit;
mod credentials;
mod utils;
mod workers;

pub use audit::*;
pub use credentials::*;
pub use utils::*;
pub use workers::*;
