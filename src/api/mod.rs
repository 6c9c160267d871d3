mod error;
mod impls;
mod requests;
mod responses;
mod tipster;
mod util;

pub use self::tipster::*;
pub use error::*;
pub use impls::*;
pub use requests::*;
pub use responses::*;
pub use util::*;
