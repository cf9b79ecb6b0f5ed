pub mod config;
pub mod error;
pub mod events;
pub mod frames;
pub mod sequence;
pub mod processing {
    pub mod chroma;
    pub mod color;
    pub mod composite;
    pub mod layout;
    pub mod mapping;
}
pub mod tasks {
    pub mod loader;
    pub mod renderer;
    pub mod surface;
}

pub use sequence::ScrollSequence;
