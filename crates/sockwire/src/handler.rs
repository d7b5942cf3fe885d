//! [`Handler`] trait and implementations, used to handle incoming events and the channel lifecycle.
//!
//! A handler is any clonable function whose first argument is the invoking [`Channel`], followed by
//! up to [`MAX_ARGS`] deserializable arguments. It returns `()` or a tuple of up to [`MAX_RETURNS`]
//! serializable values. When the peer requested an acknowledgement, the returned values are sent back
//! as the response. Handlers can be sync or async.
//!
//! Arguments are decoded only when the handler is invoked, with the codec strategy of the channel.
//! A missing trailing argument is passed as the [`Default`] value of its type.
//!
//! ## Example with a sync closure
//! ```rust
//! # use sockwire::{Channel, Config, Server};
//! let server = Server::new(Config::default());
//! server
//!     .on("ping", |_: Channel, n: i32| (n, "pong"))
//!     .unwrap();
//! ```
//!
//! ## Example with an async function
//! ```rust
//! # use sockwire::{Channel, CloseReason, Config, Server, ON_DISCONNECTION};
//! async fn on_close(channel: Channel, reason: CloseReason) {
//!     println!("channel {} closed: {}", channel.id(), reason);
//! }
//! let server = Server::new(Config::default());
//! server.on(ON_DISCONNECTION, on_close).unwrap();
//! ```
use std::{
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock},
};

use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Serialize, de::DeserializeOwned};
use sockwire_core::{
    Value,
    packet::Packet,
    parser::{Parse, ParserError},
};

use crate::{
    channel::Channel,
    errors::{HandlerError, RegistrationError},
    parser::Parser,
};

/// Name of the lifecycle handler fired once a channel is connected
pub const ON_CONNECTION: &str = "connection";
/// Name of the lifecycle handler fired once a channel is closed.
/// It may take one [`CloseReason`](crate::CloseReason) argument.
pub const ON_DISCONNECTION: &str = "disconnection";

/// The maximum number of arguments a handler may declare, the channel excluded
pub const MAX_ARGS: usize = 5;
/// The maximum number of values a handler may return
pub const MAX_RETURNS: usize = 5;

/// The signature of a registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    /// Type name of each argument after the channel
    pub args: Vec<&'static str>,
    /// Type name of each returned value
    pub returns: Vec<&'static str>,
}

impl HandlerDescriptor {
    /// Number of declared arguments, the channel excluded
    pub fn arity(&self) -> usize {
        self.args.len()
    }
    /// Number of declared return values
    pub fn return_count(&self) -> usize {
        self.returns.len()
    }
}

/// Define a handler for an event or a lifecycle name.
/// It is implemented for sync and async closures taking a [`Channel`] and up to [`MAX_ARGS`] arguments.
/// Every argument must implement [`DeserializeOwned`] and [`Default`].
/// The returned value must implement [`AckArgs`].
///
/// * See the [`handler`](crate::handler) module doc for more details.
#[diagnostic::on_unimplemented(
    note = "This function is not a Handler. Check that:
* It is a clonable `FnOnce` whose first argument is a `Channel`.
* It takes at most 5 other arguments implementing `DeserializeOwned + Default`.
* It returns `()` or a tuple of at most 5 serializable values (or a future of it).\n",
    label = "Invalid Handler"
)]
pub trait Handler<T>: Send + Sync + 'static {
    /// Decode the arguments, run the handler and encode its return values.
    fn call(
        &self,
        channel: Channel,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, HandlerError>>;

    /// The signature of the handler, checked at registration
    fn descriptor(&self) -> HandlerDescriptor;

    #[doc(hidden)]
    fn phantom(&self) -> std::marker::PhantomData<T> {
        std::marker::PhantomData
    }
}

/// The values a handler can return. They are sent back when the peer requested an acknowledgement.
///
/// It is implemented for `()` and for tuples of up to [`MAX_RETURNS`] serializable values.
pub trait AckArgs: Send + 'static {
    /// Number of values
    const LEN: usize;

    /// Type name of each value
    fn type_names() -> Vec<&'static str>;

    /// Encode every value with the given strategy
    fn into_values(self, parser: &Parser) -> Result<Vec<Value>, ParserError>;
}

impl AckArgs for () {
    const LEN: usize = 0;

    fn type_names() -> Vec<&'static str> {
        Vec::new()
    }

    fn into_values(self, _: &Parser) -> Result<Vec<Value>, ParserError> {
        Ok(Vec::new())
    }
}

macro_rules! impl_ack_args {
    ($len:literal; $($ty:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($ty,)+> AckArgs for ($($ty,)+)
        where
            $( $ty: Serialize + Send + 'static, )+
        {
            const LEN: usize = $len;

            fn type_names() -> Vec<&'static str> {
                vec![$(std::any::type_name::<$ty>(),)+]
            }

            fn into_values(self, parser: &Parser) -> Result<Vec<Value>, ParserError> {
                let ($($ty,)+) = self;
                Ok(vec![$(parser.encode_value(&$ty)?,)+])
            }
        }
    };
}

impl_ack_args!(1; R1);
impl_ack_args!(2; R1, R2);
impl_ack_args!(3; R1, R2, R3);
impl_ack_args!(4; R1, R2, R3, R4);
impl_ack_args!(5; R1, R2, R3, R4, R5);

/// Decode the argument at `index`, or its default value when the peer sent fewer arguments.
fn coerce<T: DeserializeOwned + Default>(
    parser: &Parser,
    value: Option<Value>,
    index: usize,
) -> Result<T, HandlerError> {
    match value {
        Some(value) => parser
            .decode_value(&value)
            .map_err(|source| HandlerError::Decode { index, source }),
        None => Ok(T::default()),
    }
}

mod private {
    #[derive(Debug, Copy, Clone)]
    pub enum Sync {}
    #[derive(Debug, Copy, Clone)]
    pub enum Async {}
    #[derive(Debug, Copy, Clone)]
    pub enum Raw {}
}

macro_rules! impl_handler {
    (
        [$($ty:ident),*]
    ) => {
        #[diagnostic::do_not_recommend]
        #[allow(non_snake_case, unused)]
        impl<F, R, $($ty,)*> Handler<(private::Sync, $($ty,)*)> for F
        where
            F: FnOnce(Channel, $($ty,)*) -> R + Send + Sync + Clone + 'static,
            R: AckArgs,
            $( $ty: DeserializeOwned + Default + Send + 'static, )*
        {
            fn call(
                &self,
                channel: Channel,
                args: Vec<Value>,
            ) -> BoxFuture<'static, Result<Vec<Value>, HandlerError>> {
                let handler = self.clone();
                Box::pin(async move {
                    let parser = channel.parser();
                    let mut args = args.into_iter();
                    let mut index = 0;
                    $(
                        let $ty: $ty = coerce(&parser, args.next(), index)?;
                        index += 1;
                    )*
                    let ret = handler(channel, $($ty,)*);
                    Ok(ret.into_values(&parser)?)
                })
            }

            fn descriptor(&self) -> HandlerDescriptor {
                HandlerDescriptor {
                    args: vec![$(std::any::type_name::<$ty>(),)*],
                    returns: R::type_names(),
                }
            }
        }
    };
}

macro_rules! impl_async_handler {
    (
        [$($ty:ident),*]
    ) => {
        #[diagnostic::do_not_recommend]
        #[allow(non_snake_case, unused)]
        impl<F, Fut, R, $($ty,)*> Handler<(private::Async, $($ty,)*)> for F
        where
            F: FnOnce(Channel, $($ty,)*) -> Fut + Send + Sync + Clone + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: AckArgs,
            $( $ty: DeserializeOwned + Default + Send + 'static, )*
        {
            fn call(
                &self,
                channel: Channel,
                args: Vec<Value>,
            ) -> BoxFuture<'static, Result<Vec<Value>, HandlerError>> {
                let handler = self.clone();
                Box::pin(async move {
                    let parser = channel.parser();
                    let mut args = args.into_iter();
                    let mut index = 0;
                    $(
                        let $ty: $ty = coerce(&parser, args.next(), index)?;
                        index += 1;
                    )*
                    let ret = handler(channel, $($ty,)*).await;
                    Ok(ret.into_values(&parser)?)
                })
            }

            fn descriptor(&self) -> HandlerDescriptor {
                HandlerDescriptor {
                    args: vec![$(std::any::type_name::<$ty>(),)*],
                    returns: R::type_names(),
                }
            }
        }
    };
}

#[rustfmt::skip]
macro_rules! all_the_tuples {
    ($name:ident) => {
        $name!([]);
        $name!([T1]);
        $name!([T1, T2]);
        $name!([T1, T2, T3]);
        $name!([T1, T2, T3, T4]);
        $name!([T1, T2, T3, T4, T5]);
    };
}

all_the_tuples!(impl_handler);
all_the_tuples!(impl_async_handler);

/// A handler working on raw argument values, with a signature declared at runtime.
///
/// The declared counts are checked at registration like any other handler. It is useful to proxy
/// events without knowing their types.
///
/// ```rust
/// # use sockwire::{Channel, Config, RawHandler, RegistrationError, Server};
/// let server = Server::new(Config::default());
/// let echo = RawHandler::new(1, 1, |_: Channel, args| args);
/// server.on("echo", echo).unwrap();
///
/// let too_wide = RawHandler::new(6, 0, |_: Channel, _| vec![]);
/// assert_eq!(
///     server.on("wide", too_wide),
///     Err(RegistrationError::TooManyArguments { max: 5, got: 6 })
/// );
/// ```
#[derive(Clone)]
pub struct RawHandler {
    args: usize,
    returns: usize,
    f: Arc<dyn Fn(Channel, Vec<Value>) -> Vec<Value> + Send + Sync>,
}

impl RawHandler {
    /// Create a raw handler declaring `args` arguments and `returns` return values
    pub fn new<F>(args: usize, returns: usize, f: F) -> Self
    where
        F: Fn(Channel, Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    {
        Self {
            args,
            returns,
            f: Arc::new(f),
        }
    }
}

impl std::fmt::Debug for RawHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHandler")
            .field("args", &self.args)
            .field("returns", &self.returns)
            .finish()
    }
}

impl Handler<private::Raw> for RawHandler {
    fn call(
        &self,
        channel: Channel,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, HandlerError>> {
        let f = self.f.clone();
        Box::pin(async move { Ok(f(channel, args)) })
    }

    fn descriptor(&self) -> HandlerDescriptor {
        let name = std::any::type_name::<Value>();
        HandlerDescriptor {
            args: vec![name; self.args],
            returns: vec![name; self.returns],
        }
    }
}

/// A Type Erased [`Handler`] so it can be stored in a HashMap
pub(crate) trait ErasedHandler: Send + Sync + 'static {
    fn call(
        &self,
        channel: Channel,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, HandlerError>>;
}

/// A struct used to erase the type of a [`Handler`] so it can be stored in a map
pub(crate) struct MakeErasedHandler<H, T> {
    handler: H,
    type_: std::marker::PhantomData<fn() -> T>,
}

impl<H, T> MakeErasedHandler<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    pub fn new_boxed(handler: H) -> Arc<dyn ErasedHandler> {
        Arc::new(Self {
            handler,
            type_: std::marker::PhantomData,
        })
    }
}

impl<H, T> ErasedHandler for MakeErasedHandler<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    #[inline(always)]
    fn call(
        &self,
        channel: Channel,
        args: Vec<Value>,
    ) -> BoxFuture<'static, Result<Vec<Value>, HandlerError>> {
        self.handler.call(channel, args)
    }
}

struct Entry {
    descriptor: HandlerDescriptor,
    handler: Arc<dyn ErasedHandler>,
}

/// Event name to handler map, shared by every channel of a server or by the channel of a client.
#[derive(Default)]
pub(crate) struct Registry {
    handlers: RwLock<HashMap<String, Entry>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map()
            .entries(handlers.iter().map(|(k, v)| (k, &v.descriptor)))
            .finish()
    }
}

impl Registry {
    /// Validate and register a handler. It replaces any handler bound to the same name.
    pub fn insert<H, T>(&self, event: String, handler: H) -> Result<(), RegistrationError>
    where
        H: Handler<T>,
        T: 'static,
    {
        if event.is_empty() {
            return Err(RegistrationError::EmptyEventName);
        }
        let descriptor = handler.descriptor();
        if descriptor.arity() > MAX_ARGS {
            return Err(RegistrationError::TooManyArguments {
                max: MAX_ARGS,
                got: descriptor.arity(),
            });
        }
        if descriptor.return_count() > MAX_RETURNS {
            return Err(RegistrationError::TooManyReturnValues {
                max: MAX_RETURNS,
                got: descriptor.return_count(),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(event = %event, ?descriptor, "handler registered");
        let handler = MakeErasedHandler::new_boxed(handler);
        self.write().insert(event, Entry { descriptor, handler });
        Ok(())
    }

    /// The signature of the handler bound to `event`
    pub fn descriptor(&self, event: &str) -> Option<HandlerDescriptor> {
        self.read().get(event).map(|e| e.descriptor.clone())
    }

    /// Dispatch an event received from the peer.
    ///
    /// The handler runs on its own task. When `ack` is set, its return values are sent back with this id.
    /// Unknown events and lifecycle names sent by the peer are dropped.
    pub fn dispatch(&self, channel: &Channel, event: &str, args: Vec<Value>, ack: Option<u64>) {
        if event == ON_CONNECTION || event == ON_DISCONNECTION {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = %channel.id(), event, "reserved event name sent by peer");
            return;
        }
        let Some(handler) = self.handler(event) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(sid = %channel.id(), event, "no handler registered for event");
            return;
        };
        let fut = handler.call(channel.clone(), args);
        let channel = channel.clone();
        #[cfg(feature = "tracing")]
        let event = event.to_owned();
        tokio::spawn(async move {
            let Some(values) = run_guarded(fut).await else {
                #[cfg(feature = "tracing")]
                tracing::warn!(sid = %channel.id(), event = %event, "handler failed, no ack sent");
                return;
            };
            if let Some(id) = ack {
                if let Err(_e) = channel.send_packet(Packet::ack(values, id)) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(sid = %channel.id(), event = %event, "cannot send ack response: {_e}");
                }
            }
        });
    }

    /// Fire a lifecycle handler, if one is registered.
    ///
    /// The handler runs on its own task. Outside of a tokio runtime, e.g. a channel closed after its
    /// runtime shut down, it is polled once inline instead: sync handlers run to completion,
    /// async handlers that would wait are dropped.
    pub fn dispatch_lifecycle(&self, channel: &Channel, name: &'static str, args: Vec<Value>) {
        let Some(handler) = self.handler(name) else {
            return;
        };
        let fut = handler.call(channel.clone(), args);
        #[cfg(feature = "tracing")]
        let sid = channel.id();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if run_guarded(fut).await.is_none() {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(%sid, name, "lifecycle handler failed");
                    }
                });
            }
            Err(_) => match run_guarded(fut).now_or_never() {
                Some(Some(_)) => {}
                Some(None) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%sid, name, "lifecycle handler failed");
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%sid, name, "no runtime, pending lifecycle handler dropped");
                }
            },
        }
    }

    fn handler(&self, event: &str) -> Option<Arc<dyn ErasedHandler>> {
        self.read().get(event).map(|e| e.handler.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run a handler future, turning a coercion error or a panic into `None`.
async fn run_guarded(
    fut: BoxFuture<'static, Result<Vec<Value>, HandlerError>>,
) -> Option<Vec<Value>> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(values)) => Some(values),
        Ok(Err(_e)) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("handler error: {_e}");
            None
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("handler panicked");
            None
        }
    }
}
