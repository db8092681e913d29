//! Single-area composite generation.

pub mod compositor;
pub mod fetch;
pub mod generator;
pub mod postprocess;
pub mod request;

pub use compositor::{AreaTarget, BEST_FIT_AREA_ID, Compositor, Toolbox, best_fit_area, log_context};
pub use fetch::{FetchOutcome, ObjectSource};
pub use generator::{
    CompositeGenerator, GenerationInput, GeneratorFactory, NearestRadarFactory,
    NearestRadarGenerator,
};
pub use postprocess::{CloudTypeSource, GraCoefficient, GraCoefficientSource, MemoryGraSource};
pub use request::{CompositeRequest, ProductParameters};
