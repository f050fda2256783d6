pub use config::{
    Direction, EngineConfig, EngineConfigError, ShowTranslateError, ShowType, Transition,
    ENGINE_VERSION_2A,
};
pub use engine::{EffectsEngine, CANVAS_SIZE, FRAME_MILLIS};
pub use pool::EnginePool;

mod config;
#[allow(clippy::module_inception)]
mod engine;
mod pool;
