#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("grid extent on axis {axis} must be positive and finite, got {value}")]
    InvalidExtent { axis: char, value: f64 },

    #[error("sector size on axis {axis} must be positive and finite, got {value}")]
    InvalidSectorSize { axis: char, value: f64 },

    #[error(
        "toroidal extent {extent} on axis {axis} is not a whole multiple of the sector size {sector_size}"
    )]
    UnalignedSectorSize {
        axis: char,
        extent: f64,
        sector_size: f64,
    },

    #[error("sector indexing requires a symmetrical grid: {message}")]
    AsymmetricGrid { message: String },

    #[error("invalid distance `{name}`: {value}")]
    InvalidDistance { name: &'static str, value: f64 },

    #[error("invalid engine configuration: {message}")]
    InvalidConfig { message: String },

    #[error("a plane named `{name}` is already registered")]
    DuplicatePlane { name: String },

    #[error("no plane named `{name}` is registered")]
    UnknownPlane { name: String },

    #[error("entity {entity} is not tracked by the engine")]
    UnknownEntity { entity: String },

    #[error("entity {entity} produced a non-finite position ({x}, {y}, {z})")]
    NonFinitePosition {
        entity: String,
        x: f64,
        y: f64,
        z: f64,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
