pub mod event;
pub mod hit;

pub use event::{Event, EventDto, EventFilter, EventSort, EventState, NewEventRequest};
pub use hit::{
    format_timestamp, now_utc, parse_timestamp, HitRecord, StatsQuery, ViewStat,
    TIMESTAMP_FORMAT,
};
