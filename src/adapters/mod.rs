//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements    | Connects to               |
//! |--------------|---------------|---------------------------|
//! | `fs_store`   | BlockStore    | Host directory            |
//! | `mem_store`  | BlockStore    | RAM (tests, RAM disk)     |
//! | `log_sink`   | EventSink     | `log` facade              |
//! | `nvs`        | StoragePort   | Key/value map, RAM / file |
//! |              | ConfigPort    |                           |
//! |              | NonceLedger   |                           |

pub mod fs_store;
pub mod log_sink;
pub mod mem_store;
pub mod nvs;
