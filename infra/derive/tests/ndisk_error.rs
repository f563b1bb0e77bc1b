mod demo {
    use ndisk_derive::ndisk_error;
    use std::borrow::Cow;

    #[ndisk_error]
    pub enum MarkerError {
        #[opaque]
        #[error("IO error{}: {source}", format_context(.context))]
        Io {
            #[source]
            source: std::io::Error,
            context: Option<Cow<'static, str>>,
        },

        #[error("Quota exceeded{}: {requested} bytes", format_context(.context))]
        Quota { requested: u64, context: Option<Cow<'static, str>> },

        #[opaque]
        #[error("Internal error{}: {message}", format_context(.context))]
        Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    }
}

use demo::{MarkerError, MarkerErrorExt};

fn read_missing() -> Result<Vec<u8>, MarkerError> {
    std::fs::read("/definitely/not/here/ndisk").context("Reading marker")
}

#[test]
fn ndisk_error_ui() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/ndisk_error_pass.rs");
}

#[test]
fn source_errors_convert_with_context() {
    let err = read_missing().unwrap_err();
    assert!(matches!(err, MarkerError::Io { ref context, .. } if context.as_deref() == Some("Reading marker")));
    assert!(err.to_string().starts_with("IO error (Reading marker): "));
}

#[test]
fn context_is_attached_to_own_variants() {
    let result: Result<(), MarkerError> =
        Err(MarkerError::Quota { requested: 10, context: None });
    let err = result.context("user-1").unwrap_err();
    assert_eq!(err.to_string(), "Quota exceeded (user-1): 10 bytes");
}

#[test]
fn strings_convert_into_internal() {
    let err: MarkerError = "lost invariant".into();
    assert!(matches!(err, MarkerError::Internal { .. }));
    let err: MarkerError = format!("code {}", 7).into();
    assert_eq!(err.to_string(), "Internal error: code 7");
}

#[test]
fn opaque_variants_hide_details() {
    let io: MarkerError = std::io::Error::other("disk on fire").into();
    assert!(io.is_opaque());
    assert_eq!(io.public_message(), "internal error");

    let quota = MarkerError::Quota { requested: 5, context: None };
    assert!(!quota.is_opaque());
    assert_eq!(quota.public_message(), "Quota exceeded: 5 bytes");
}
