use serde::Deserialize;

use crate::{
    auth::repo_types::{Role, UserStatus},
    pagination::Pagination,
};

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub q: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl UserQuery {
    pub fn page(&self) -> Pagination {
        Pagination::from_parts(self.limit, self.offset)
    }
}

/// Absent fields keep their current value; an empty `phone` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct AdminUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}
