// Submodules for separation of concerns
mod builder;
mod descriptor;
mod eval;
mod exec;
mod types;

pub use builder::{
    combine_ordering_for_bound, make_bound_from_snapshot, make_bound_from_values, make_filter,
    make_query_filter,
};
pub use descriptor::{ExecutionTarget, QueryDescriptor};
pub use eval::{compare_docs, eval_filter, query_field};
pub use exec::run_query;
pub use types::{
    Bound, BoundPosition, Direction, Filter, FilterOperator, FilterValue, LimitType, OrderBy,
};
