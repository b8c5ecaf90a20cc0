/// Database models
///
/// Each model is a `sqlx::FromRow` struct with its queries as associated
/// functions taking a `&PgPool` (or a `&mut PgConnection` for operations
/// that must run inside a caller's transaction).
///
/// - `user`: accounts, roles, verification and reset tokens
/// - `course`: catalogue, capacity counter, deletion cascade
/// - `enrollment`: course enrollments
/// - `payment`: gateway payments for enrollments and appointments
/// - `appointment`: consultation bookings
/// - `assignment`: assignments, submissions and marks
/// - `live_class`: live sessions and attendance
/// - `blog`: blog posts
/// - `consultation`: contact-form consultation requests
/// - `newsletter`: newsletter subscribers
/// - `email_job`: outbound email outbox

pub mod appointment;
pub mod assignment;
pub mod blog;
pub mod consultation;
pub mod course;
pub mod email_job;
pub mod enrollment;
pub mod live_class;
pub mod newsletter;
pub mod payment;
pub mod user;
