//! Stateful and stateless operators over Z-sets and indexed Z-sets.
//!
//! Linear operators (§4.3) are plain functions on [`crate::zset::ZSet`];
//! everything here with per-step state (joins, aggregations, temporal
//! operators, windows, recursion) is a struct carrying that state across
//! calls to its `step` method.

pub mod aggregate;
pub mod join;
pub mod linear;
pub mod recursive;
pub mod temporal;
pub mod window;

pub use aggregate::{Aggregate, Average, Count, Sum};
pub use join::{
    AntiJoin, CrossJoin, DispatchPath, FullOuterJoin, Join, JoinDispatcher, LeftOuterJoin,
    RightOuterJoin, SemiJoin,
};
pub use recursive::{fixed_point, Termination, Tolerance};
pub use temporal::{Clock, Delay, Differentiate, Generator, Inspect, Integrate};
pub use window::{SlidingCount, Tumbling};
