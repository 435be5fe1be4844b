pub mod bsv;
pub mod traits;

pub use traits::{DigestFn, PreimageSource};
