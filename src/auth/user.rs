use serde::Serialize;

use super::{Permission, Role};
use crate::error::AppError;

/// The authenticated identity an operation runs on behalf of.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Caller {
    pub account_id: i64,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub student_id: Option<i64>,
    pub teacher_id: Option<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCaller {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub active: bool,
    pub student_id: Option<i64>,
    pub teacher_id: Option<i64>,
}

impl From<DbCaller> for Caller {
    fn from(row: DbCaller) -> Self {
        Self {
            account_id: row.id,
            email: row.email,
            role: row.role,
            active: row.active,
            student_id: row.student_id,
            teacher_id: row.teacher_id,
        }
    }
}

impl Caller {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.active && self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                account_id = %self.account_id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Forbidden(format!(
                "Role '{}' may not perform {:?}",
                self.role, permission
            )))
        }
    }
}
