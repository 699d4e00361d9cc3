//! Lock-free SPSC Channel
//!
//! A bounded, single-producer single-consumer (SPSC) channel implemented using
//! a lock-free ring buffer with atomic head/tail indices.
//!
//! ## How It Works
//!
//!```
//!                   tail (producer writes here)
//!                   ↓
//! ┌───┬───┬───┬───┬───┬───┬───┬───┐
//! │ 0 │ 1 │ 2 │ 3 │ 4 │ 5 │ 6 │ 7 │  Ring Buffer (N = 8)
//! └───┴───┴───┴───┴───┴───┴───┴───┘
//!       ↑
//!       head (consumer reads here)
//!```
//!
//! - **Producer** writes to `buffer[tail % N]`, then increments `tail`
//! - **Consumer** reads from `buffer[head % N]`, then increments `head`
//! - **Buffer full**: `tail - head >= N`
//! - **Buffer empty**: `tail == head`
//!
//! ## Synchronization
//!
//! No locks or OS primitives are used. Synchronization relies on:
//!
//! | Operation | Memory Ordering | Purpose |
//! |-----------|-----------------|---------|
//! | Read own index | `Relaxed` | Only one thread modifies it |
//! | Read other's index | `Acquire` | See their writes to the buffer |
//! | Write own index | `Release` | Make buffer writes visible |
//!
//! The `Acquire`/`Release` pairing ensures that
//! - when the consumer sees a new `tail` value, it also sees the data the producer wrote to the buffer.
//! - when the producer sees a new `head` value, it also sees that the consumer has read data from the buffer.
//!
//! ## Cache Optimization
//!
//! Most of the fields of [`Channel`] are cache-padded ([`CachePadded`](crossbeam_utils::CachePadded))
//! to prevent false sharing between producer and consumer threads.
//!
//! ## Async Support
//!
//! With the `async` feature, [`send()`](Sender::send) and [`recv()`](Receiver::recv)
//! return futures that poll the underlying lock-free operations. The futures
//! themselves make no OS calls—whether the OS is involved depends on your runtime
//!
//! ## Example
//!
//!```
//! use weave::spsc::channel;
//!
//! let (tx, rx) = channel4::<i32>();  // Buffer size must be power of 2
//!
//! tx.try_send(1).unwrap();
//! tx.try_send(2).unwrap();
//!
//! assert_eq!(rx.try_recv().unwrap(), Some(1));
//! assert_eq!(rx.try_recv().unwrap(), Some(2));
//! assert_eq!(rx.try_recv().unwrap(), None);  // Empty
//! ```
mod channel;
mod error;
mod receiver;
mod sender;

use channel::Channel;
pub use error::*;
pub use receiver::Receiver;
#[cfg(feature = "async")]
pub use receiver::RecvFuture;
#[cfg(feature = "async")]
pub use sender::SendFuture;
pub use sender::Sender;
pub fn channel<T, const N: usize>() -> (Sender<T, N>, Receiver<T, N>) {
    Channel::default().split()
}

/// Generates type aliases for common buffer sizes.
///
/// Creates types like `Sender2<T>`, `channel16<T>`, `Receiver64<T>`, etc.
macro_rules! define_size_aliases {
    ($($n:literal),* $(,)?) => {
        paste::paste! {
            $(
                pub type [<Sender $n>]<T> = Sender<T, $n>;
                pub type [<Receiver $n>]<T> = Receiver<T, $n>;

                #[cfg(feature = "async")]
                pub type [<SendFuture $n>]<'a, T> = SendFuture<'a, T, $n>;
                #[cfg(feature = "async")]
                pub type [<RecvFuture $n>]<'a, T> = RecvFuture<'a, T, $n>;

                /// Creates a channel with buffer size $n.
                pub fn [<channel $n>]<T>() -> ([<Sender $n>]<T>, [<Receiver $n>]<T>) {
                    channel::<T, $n>()
                }
            )*
        }
    };
}

// Generate aliases for powers of 2
define_size_aliases!(2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192);
