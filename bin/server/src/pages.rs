//! Page components for the application.
//!
//! Each page is a Leptos component that renders a specific route,
//! along with any server functions specific to that page.

pub mod dashboard;
pub mod home;
pub mod login;

// Re-export all page components for convenient access
pub use dashboard::{AdminDashboard, AuthorDashboard, InstitutionDashboard};
pub use home::{AboutPage, HomePage, UnauthorizedPage};
pub use login::{LoginPage, SignupPage};
