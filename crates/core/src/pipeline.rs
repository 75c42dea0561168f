//! Pre- and post-processing hooks around a conversion.

use std::borrow::Cow;

/// Trait for rewriting document text before or after the main passes.
///
/// Implemented for any `Fn(&str) -> Cow<str>` closure, so most hooks are
/// written inline.
pub trait TextTransform: Send + Sync {
    /// Transform the input text, returning an owned or borrowed string.
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str>;
}

impl<F> TextTransform for F
where
    F: for<'a> Fn(&'a str) -> Cow<'a, str> + Send + Sync,
{
    fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
        (self)(input)
    }
}

/// Ordered list of text transforms applied one after another.
#[derive(Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn TextTransform>>,
}

impl TransformChain {
    /// Create an empty chain (the identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform.
    pub fn push<T: TextTransform + 'static>(&mut self, transform: T) {
        self.transforms.push(Box::new(transform));
    }

    /// Returns true if no transform is registered.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Number of registered transforms.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Run every transform in registration order.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(input);
        for transform in &self.transforms {
            let next = transform.transform(current.as_ref());
            current = Cow::Owned(next.into_owned());
        }
        current
    }
}

impl std::fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformChain")
            .field("len", &self.transforms.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain_borrows() {
        let chain = TransformChain::new();
        assert!(matches!(chain.apply("abc"), Cow::Borrowed("abc")));
    }

    fn a_to_b(s: &str) -> Cow<'_, str> {
        Cow::Owned(s.replace('a', "b"))
    }

    fn b_to_c(s: &str) -> Cow<'_, str> {
        Cow::Owned(s.replace('b', "c"))
    }

    #[test]
    fn transforms_run_in_order() {
        let mut chain = TransformChain::new();
        chain.push(a_to_b);
        chain.push(b_to_c);
        assert_eq!(chain.apply("aab"), "ccc");
        assert_eq!(chain.len(), 2);
    }

    struct Upper;

    impl TextTransform for Upper {
        fn transform<'a>(&self, input: &'a str) -> Cow<'a, str> {
            Cow::Owned(input.to_uppercase())
        }
    }

    #[test]
    fn struct_strategies_work_too() {
        let mut chain = TransformChain::new();
        chain.push(Upper);
        assert_eq!(chain.apply("shout"), "SHOUT");
    }
}
