pub mod model;
pub mod repository;

pub use model::{validate_tag_shape, IdTag, IdTagAuthStatus, User, UserStatus, ID_TAG_MAX_LEN};
pub use repository::{IdTagRepository, UserRepository};
