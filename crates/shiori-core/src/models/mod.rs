mod video;

pub use video::{
    FolderGroup, VideoRecord, WatchState, COMPLETION_THRESHOLD, WATCHED_THRESHOLD,
};
