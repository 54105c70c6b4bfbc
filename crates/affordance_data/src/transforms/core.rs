use anyhow::{Context, Result};
use std::marker::PhantomData;

/// A pure, stateless step that turns an input of type `I` into an output of
/// type `O`.
///
/// Steps compose with `.then(...)`. Because each stage's input type is the
/// previous stage's output type, a statically composed pipeline can only be
/// assembled in an order the types permit:
///
/// ```ignore
/// // RawSample -> RawSample -> TensorSample -> TensorSample
/// let pipeline = CenterCrop::new(256, 320)?
///     .then(ToTensor)
///     .then(Normalize::part_affordance());
/// ```
pub trait Transform<I, O>: Send + Sync {
    fn apply(&self, input: I) -> Result<O>;

    #[inline]
    fn then<T, M>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, M>,
        O: Send,
        M: Send,
    {
        Chain::new(self, next)
    }
}

/// Two transforms run back to back (`A` then `B`).
/// `M` is the intermediate type handed from `A` to `B`.
#[derive(Debug)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _marker: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        let mid = self.first.apply(input)?;
        self.second.apply(mid).with_context(|| {
            format!(
                "Transform chain failed after {} in {}",
                short_type_name::<A>(),
                short_type_name::<B>()
            )
        })
    }
}

/// `affordance_data::transforms::vision::geometric::CenterCrop` -> `CenterCrop`
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
