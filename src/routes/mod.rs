/// Router Module Index
///
/// Routes are split by access level. Authentication is applied as a layer on the
/// authenticated module; ownership and publication checks happen in the guard.

/// Routes reachable without credentials. Handlers that serve a single map still
/// run the guard read check with the optional caller.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
pub mod authenticated;

/// Routes restricted to administrators (checked in the handlers).
pub mod admin;
