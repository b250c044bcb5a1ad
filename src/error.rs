use std::alloc::Layout;

/// Ways an operation on a [`Shared`](crate::Shared) handle can fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The handle is empty, so there is no value to access
    #[error("accessed the value of an empty shared handle")]
    NullAccess,

    /// Memory for the value or its counter block could not be allocated
    #[error("allocation of {layout:?} failed")]
    Alloc { layout: Layout },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn alloc(layout: Layout) -> Self {
        Error::Alloc { layout }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            Error::NullAccess.to_string(),
            "accessed the value of an empty shared handle"
        );

        let message = Error::alloc(Layout::new::<u64>()).to_string();
        assert!(message.starts_with("allocation of"), "{message}");
        assert!(message.ends_with("failed"), "{message}");
    }
}
