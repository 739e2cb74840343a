#![doc = include_str!("../README.md")]

pub mod collection;
pub mod collector;
pub mod event_list;
pub mod events;
pub mod key;
mod registry;
pub mod scope;
pub mod script;
pub mod thread_data;

pub use collection::{EventRecord, RecordValue, TraceCollection};
pub use collector::{CollectionSubscriber, TraceCollector};
pub use event_list::{EventList, PayloadView};
pub use events::{ArgValue, CategoryId, Event, EventKind, PayloadValue, TimeStamp, TraceData};
pub use key::{DynamicKey, KeyToken, StaticKey, TraceKeyRef};
pub use scope::TraceScope;
pub use script::ScriptRuntime;
pub use thread_data::{PerThreadData, ThreadIndex};
