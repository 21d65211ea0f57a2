pub mod cancel_guard;
pub mod header;
pub mod lazy;
pub mod map;
pub mod schema_gate;

pub use cancel_guard::CancelGuard;
pub use header::HeaderDiscovery;
pub use lazy::{LazyStage, StageFactory};
pub use map::{MapContext, MapStage, Mapper};
pub use schema_gate::SchemaGate;
