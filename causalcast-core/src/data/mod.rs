//! Price acquisition: providers, alignment, caching.

pub mod acquire;
pub mod align;
pub mod cache;
pub mod provider;
pub mod synthetic;
pub mod universe;
pub mod yahoo;

pub use acquire::{acquire_prices, validate_prices, AcquireRequest, Acquisition};
pub use align::{align_prices, AlignmentPolicy};
pub use cache::{CacheMeta, PriceCache};
pub use provider::{DataError, DataProvider, DataSource, FetchResult, RawPrice};
pub use synthetic::{gbm_path, SyntheticProvider};
pub use universe::{default_assets, validate_assets, AssetSpec};
pub use yahoo::YahooProvider;
