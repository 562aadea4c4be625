pub mod user_id;

pub use user_id::{CurrentUser, USER_ID_HEADER};
