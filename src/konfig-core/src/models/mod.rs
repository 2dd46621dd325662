pub mod kinds;
pub mod resource;
pub mod value;

pub use kinds::*;
pub use resource::*;
pub use value::*;
