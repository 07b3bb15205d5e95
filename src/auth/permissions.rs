use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnReportCard,
    ViewOwnGrades,
    ViewAnnouncements,
    ViewCourses,

    ViewAnyReportCard,
    ViewAllGrades,
    RecordGrades,
    EditGrades,
    DeleteGrades,
    UpdateEnrollmentStatus,
    PublishAnnouncements,
    ViewRoster,

    ManageEnrollments,
    ManageCourses,
    ManageStudents,
    ManageTeachers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

static STUDENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnReportCard);
    permissions.insert(Permission::ViewOwnGrades);
    permissions.insert(Permission::ViewAnnouncements);
    permissions.insert(Permission::ViewCourses);

    permissions
});

static TEACHER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(STUDENT_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewAnyReportCard);
    permissions.insert(Permission::ViewAllGrades);
    permissions.insert(Permission::RecordGrades);
    permissions.insert(Permission::EditGrades);
    permissions.insert(Permission::DeleteGrades);
    permissions.insert(Permission::UpdateEnrollmentStatus);
    permissions.insert(Permission::PublishAnnouncements);
    permissions.insert(Permission::ViewRoster);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(TEACHER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageEnrollments);
    permissions.insert(Permission::ManageCourses);
    permissions.insert(Permission::ManageStudents);
    permissions.insert(Permission::ManageTeachers);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Student => &STUDENT_PERMISSIONS,
            Role::Teacher => &TEACHER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Validation(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
