use ndisk_derive::ndisk_error;
use std::borrow::Cow;

#[ndisk_error(opaque_message = "storage unavailable")]
pub enum DemoError {
    #[opaque]
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Missing object{}: {key}", format_context(.context))]
    Missing { key: String, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn main() {
    let err = DemoError::from("boom");
    assert!(!err.is_opaque());
}
