//! # Logging
//!
//! Structured logs through `tracing`. Every adapter and orchestrator entry point opens a
//! span carrying `entity_type`, `name` and `target`, so one line reads as the path a
//! request took:
//!
//! ```text
//! INFO create{entity_type="virtual-server" name="shop" target="10.10.0.1"}: Virtual server created
//! WARN modify{..}: pool 'avi-old' kept: still referenced by virtual-server 'avi-two' uuid=pool-7
//! ```
//!
//! Verbosity comes from `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=info cargo run
//! RUST_LOG=lb_control_plane::reconcile=debug cargo run
//! RUST_LOG=trace cargo run   # every appliance call
//! ```

pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
