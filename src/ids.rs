//! Typed document identifiers.
//!
//! Every record type gets its own id newtype so a workout id can't be handed
//! to a query expecting a user id. On the wire and in the store they are plain
//! strings.

use std::{convert::Infallible, fmt};

use rocket::{
    form::{self, FromFormField, ValueField},
    request::FromParam,
    serde::{Deserialize, Serialize},
};
use uuid::Uuid;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
        #[serde(crate = "rocket::serde", transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh random id (128 bits, lowercase hex).
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl<'a> FromParam<'a> for $name {
            type Error = Infallible;

            fn from_param(param: &'a str) -> Result<Self, Self::Error> {
                Ok(Self(param.to_string()))
            }
        }

        #[rocket::async_trait]
        impl<'v> FromFormField<'v> for $name {
            fn from_value(field: ValueField<'v>) -> form::Result<'v, Self> {
                Ok(Self(field.value.to_string()))
            }
        }
    };
}

typed_id!(UserId);
typed_id!(WorkoutId);
typed_id!(ExerciseId);
typed_id!(CommentId);
typed_id!(
    /// Id of a single like row; a user may own several for one workout.
    LikeId
);
typed_id!(StarId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct_hex() {
        let a = WorkoutId::generate();
        let b = WorkoutId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = UserId::from("abc");
        let json = rocket::serde::json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
