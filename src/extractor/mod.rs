pub mod catalog;
pub mod models;
pub mod traits;
pub mod ytdlp;

pub use catalog::StreamCatalog;
pub use models::{ExtractedMedia, Format, StreamDescriptor, StreamKind, VideoInfo};
pub use traits::Extractor;
pub use ytdlp::YtDlpExtractor;
