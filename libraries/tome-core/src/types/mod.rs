mod ids;
mod playlist;
mod stream;
mod time;

pub use ids::{PlTrackId, PlaylistId};
pub use playlist::{BookData, PlaylistInfo, TrackEntry};
pub use stream::{PositionData, StreamData};
pub use time::{NegativeStreamTime, StreamTime, TimeUnit};
