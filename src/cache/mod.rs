//! On-disk image cache
//!
//! Everything below the cache root is owned by imgsync. A sync computes
//! the set of paths that should exist and removes everything else, so
//! files placed there by hand do not survive.
//!
//! # Layout
//!
//! | Path | Present when |
//! |------|--------------|
//! | `<root>/<list>` | list is enabled |
//! | `<root>/<list>/images` | list is trusted, verified and unexpired |
//! | `<root>/<list>/images/<id>` | image is subscribed and verified |
//! | `<root>.lock` | held while a sync runs |

pub mod lock;
pub mod reconcile;

pub use lock::CacheLock;
pub use reconcile::{CacheManager, CachedImage, ImageFailure, SyncReport, IMAGES_DIR};
