//! Actor-based monitoring system
//!
//! Each actor runs as an independent async task and is driven through a
//! cloneable handle that wraps its mpsc command channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!   runtime events            swarm tasks              resource stats
//!        |                        |                          |
//!  +-----v--------+       +-------v-------+          +-------v------+
//!  | EventFeed    |       | SwarmPoller   |          | Sampler      |
//!  +-----+--------+       +-------+-------+          +---+------+---+
//!        |    observations        |                      |      |
//!        +-----------+------------+              upsert  |      | notify
//!                    |                                   |      |
//!             +------v-------+                    +------v--+ +-v-----------+
//!             | Health       | tracker + debounce | Storage | | Broadcaster |
//!             +------+-------+                    +----^----+ +-----+-------+
//!                    | admitted alerts                 |            | snapshots
//!             +------v-------+   delivered count      |      +-----v-------+
//!             | Alert        +------------------------+      | WebSocket   |
//!             +------+-------+                               | clients     |
//!                    | Notifier                              +-------------+
//! ```
//!
//! ## Actor Types
//!
//! - **EventFeedActor**: Consumes the runtime event stream and forwards container and service changes
//! - **SwarmPollerActor**: Polls swarm tasks for fresh failures
//! - **HealthActor**: Owns the state tracker and debouncer, decides when to alert
//! - **AlertActor**: Formats and delivers alerts, counts successful deliveries
//! - **SamplerActor**: Samples container resources and stores rates
//! - **BroadcastActor**: Coalesces change notifications into dashboard pushes
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Dashboard snapshots fan out over a broadcast channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod alert;
pub mod broadcaster;
pub mod event_feed;
pub mod health;
pub mod messages;
pub mod sampler;
pub mod swarm_poller;
