/// Authorization checks
///
/// There are two roles, admin and regular user. Resources carry an owner
/// (the course instructor, the appointment's user, the payment's payer) and
/// every ownership check has the same shape: the caller owns the resource or
/// the caller is an admin.
///
/// Course-scoped resources (assignments, live classes) add a third level:
/// a student with an active enrollment may read them.
///
/// # Example
///
/// ```no_run
/// use meridian_shared::auth::authorization::{require_admin, require_owner_or_admin};
/// use meridian_shared::auth::middleware::AuthContext;
/// use uuid::Uuid;
///
/// # fn example(auth: AuthContext, instructor_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// require_owner_or_admin(&auth, instructor_id)?;
/// require_admin(&auth)?;
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::enrollment::{CourseEnrollment, EnrollmentStatus};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Operation requires the admin role
    #[error("Admin access required")]
    AdminRequired,

    /// Caller neither owns the resource nor is an admin
    #[error("Not authorized to access this resource")]
    NotAuthorized,

    /// Caller has no active enrollment in the course
    #[error("Not enrolled in this course")]
    NotEnrolled,

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// How a caller is allowed to see a course's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseAccess {
    /// Instructor of the course, or an admin
    Staff,

    /// Student with an active or completed enrollment
    Student,
}

impl CourseAccess {
    pub fn is_staff(&self) -> bool {
        matches!(self, CourseAccess::Staff)
    }
}

/// Requires the admin role
pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    if !auth.is_admin {
        return Err(AuthzError::AdminRequired);
    }

    Ok(())
}

/// Requires `auth.user_id == owner_id` or the admin role
pub fn require_owner_or_admin(auth: &AuthContext, owner_id: Uuid) -> Result<(), AuthzError> {
    if !auth.is_owner_or_admin(owner_id) {
        return Err(AuthzError::NotAuthorized);
    }

    Ok(())
}

/// Resolves the caller's access to a course's content
///
/// Staff access never touches the database. Otherwise the caller's
/// enrollment must be active (or completed); a pending enrollment whose
/// payment has not been confirmed does not grant access.
///
/// # Errors
///
/// Returns `AuthzError::NotEnrolled` when the caller is neither staff nor an
/// active student.
pub async fn require_course_access(
    pool: &PgPool,
    auth: &AuthContext,
    course_id: Uuid,
    instructor_id: Uuid,
) -> Result<CourseAccess, AuthzError> {
    if auth.is_owner_or_admin(instructor_id) {
        return Ok(CourseAccess::Staff);
    }

    let enrollment = CourseEnrollment::find_by_course_and_user(pool, course_id, auth.user_id).await?;

    match enrollment {
        Some(e) if matches!(e.status, EnrollmentStatus::Active | EnrollmentStatus::Completed) => {
            Ok(CourseAccess::Student)
        }
        _ => Err(AuthzError::NotEnrolled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&AuthContext::new(Uuid::new_v4(), true)).is_ok());
        assert!(matches!(
            require_admin(&AuthContext::new(Uuid::new_v4(), false)),
            Err(AuthzError::AdminRequired)
        ));
    }

    #[test]
    fn test_require_owner_or_admin() {
        let owner = Uuid::new_v4();

        assert!(require_owner_or_admin(&AuthContext::new(owner, false), owner).is_ok());
        assert!(require_owner_or_admin(&AuthContext::new(Uuid::new_v4(), true), owner).is_ok());
        assert!(matches!(
            require_owner_or_admin(&AuthContext::new(Uuid::new_v4(), false), owner),
            Err(AuthzError::NotAuthorized)
        ));
    }

    #[test]
    fn test_course_access_is_staff() {
        assert!(CourseAccess::Staff.is_staff());
        assert!(!CourseAccess::Student.is_staff());
    }

    #[test]
    fn test_authz_error_display() {
        assert!(AuthzError::AdminRequired.to_string().contains("Admin"));
        assert!(AuthzError::NotEnrolled.to_string().contains("enrolled"));
        assert!(AuthzError::NotAuthorized.to_string().contains("Not authorized"));
    }
}
