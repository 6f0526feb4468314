//! Data layer: core types, loading, facets, filtering and aggregation.
//!
//! Architecture:
//! ```text
//!  .csv / .json / .parquet  (path or URL)
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  fetch + parse + normalise → Table
//!   └──────────┘
//!        │                     ┌───────────┐
//!        ├────────────────────▶│ transform │  opt-in sign inversion → new Table
//!        ▼                     └───────────┘
//!   ┌──────────┐
//!   │  facet    │  distinct options per dimension → default Selection
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  apply Selection predicates → View (row indices)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌───────────┐
//!   │ aggregate  │  counts, means, mode, word frequency, ...
//!   └───────────┘
//! ```

pub mod aggregate;
pub mod facet;
pub mod filter;
pub mod loader;
pub mod model;
pub mod transform;
