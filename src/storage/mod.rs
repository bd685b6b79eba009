/*! Transport byte plumbing.

The `storage` module provides the buffers the TCP endpoints are built on:

 * [ByteStream], a bounded FIFO of bytes with EOF signalling and a sticky
   error flag, backed by a ring over owned or borrowed storage.
 * [Reassembler], which accepts out-of-order substrings of the stream and
   flushes the contiguous prefix into a ByteStream.

[ByteStream]: struct.ByteStream.html
[Reassembler]: struct.Reassembler.html
*/

mod byte_stream;
mod reassembler;

pub use self::byte_stream::ByteStream;
pub use self::reassembler::Reassembler;
