mod assembler;
pub(crate) mod composer;

pub use assembler::ClipAssembler;
pub use composer::{Background, ClipComposer, Composition, RenderedClip};
