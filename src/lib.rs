mod bodf;
mod contingency;
mod dense;
mod error;
mod factors;
mod incidence;
mod loadcase;
mod lpf;
mod math;
mod network;
mod opt;
mod ptdf;
mod savecase;
mod security;
mod topology;
mod traits;

pub mod debug;


pub use bodf::*;
pub use contingency::*;
pub use dense::*;
pub use error::*;
pub use factors::*;
pub use incidence::*;
pub use loadcase::*;
pub use lpf::*;
pub use network::*;
pub use opt::*;
pub use ptdf::*;
pub use savecase::*;
pub use security::*;
pub use topology::*;
pub use traits::*;
