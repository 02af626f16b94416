//! Run with: cargo run -p shiori-runtime --example scan -- <dir>
//!
//! Scans a directory for video files and prints the grouped listing.

use std::path::PathBuf;
use std::sync::Arc;

use shiori_core::format;
use shiori_core::index::FsMediaIndex;
use shiori_core::storage::ProgressStore;
use shiori_runtime::{LibraryService, StoreHandle};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("shiori_core=debug,shiori_runtime=debug")
        .init();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let store = ProgressStore::open_memory().expect("open in-memory store");
    let store = StoreHandle::with_store(store).expect("spawn store thread");
    let library = LibraryService::new(Arc::new(FsMediaIndex::new(vec![root])), store);

    library.refresh().await;
    library.wait_for_refresh().await;

    let state = library.state().await;
    println!("{}", state.status);
    for folder in &state.folders {
        if let Some(video) = folder.sole_video() {
            println!("  {}  ({})", folder.name, format::file_size(video.size_bytes));
        } else {
            println!("  {}/  ({} videos)", folder.name, folder.video_count);
            for video in &folder.videos {
                println!("    {}", video.display_title());
            }
        }
    }
}
