//! episode-store: raw capture containers, validation, dataset assembly, and splits

mod error;
pub use error::{Error, Result};

mod episode;
pub use episode::{
    episode_index_from_name, load_image_stream, load_joint_series, EpisodeFile, RawEpisode,
    EPISODE_PREFIX,
};

mod validate;
pub use validate::{scan_episode_dir, validate_episodes};

mod container;
pub use container::{
    sidecar_path, DatasetMetadata, DatasetReader, DatasetWriter, DemoMeta, DemoRecord, SplitMeta,
};

mod split;
pub use split::{split_train_val, SplitAssignment, DEFAULT_SPLIT_SEED};
