// Pipeline primitives shared by the reader and writer.

pub mod bom;
pub mod buffer;
pub mod decoder;
pub mod delimiter;
pub mod encoder;
pub mod sink;
pub mod source;
pub mod stream;

pub use bom::*;
pub use buffer::*;
pub use decoder::*;
pub use delimiter::*;
pub use encoder::*;
pub use sink::*;
pub use source::*;
pub use stream::*;
