pub mod codec;
pub mod importer;
pub mod normalize;
pub mod scope;
pub mod state;

pub use codec::*;
pub use importer::*;
pub use normalize::*;
pub use scope::*;
pub use state::*;
