//! Registration macros for handler factories
//!
//! - `register_handler!` - register a handler type with a constructor expression
//! - `register_handler_default!` - register a handler type using its `Default` impl
//! - `submit_handler!` - register at link time through `inventory`
//!
//! # Example
//!
//! ```ignore
//! use avatarchat_core::handler::HandlerRegistry;
//! use avatarchat_core::register_handler_default;
//!
//! let mut registry = HandlerRegistry::new();
//! register_handler_default!(registry, "echo", EchoHandler)?;
//! ```

/// Register a handler type with a constructor expression
///
/// Evaluates to the `Result` of [`HandlerRegistry::register`](crate::handler::HandlerRegistry::register).
///
/// ```ignore
/// register_handler!(registry, "echo", EchoHandler::new(42))?;
/// ```
#[macro_export]
macro_rules! register_handler {
    ($registry:expr, $handler_type:literal, $constructor:expr) => {{
        struct Factory;
        impl $crate::handler::HandlerFactory for Factory {
            fn create(&self) -> $crate::Result<Box<dyn $crate::handler::Handler>> {
                Ok(Box::new($constructor))
            }

            fn handler_type(&self) -> &str {
                $handler_type
            }
        }
        $registry.register(std::sync::Arc::new(Factory))
    }};
}

/// Register a handler type that implements `Default`
#[macro_export]
macro_rules! register_handler_default {
    ($registry:expr, $handler_type:literal, $handler:ty) => {
        $crate::register_handler!($registry, $handler_type, <$handler>::default())
    };
}

/// Submit a handler type to the link-time registry
///
/// ```ignore
/// submit_handler!("avatar", AvatarHandler);
/// ```
#[macro_export]
macro_rules! submit_handler {
    ($handler_type:literal, $handler:ty) => {
        $crate::inventory::submit! {
            $crate::handler::HandlerRegistration::new(
                $handler_type,
                || -> Box<dyn $crate::handler::Handler> { Box::new(<$handler>::default()) },
            )
        }
    };
}
