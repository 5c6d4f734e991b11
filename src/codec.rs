use std::io::{Cursor, Write};

/// The `IntoBytestream` trait allows the conversion of an object into a
/// bytestream attached to a byte-oriented sink.
pub trait IntoBytestream {
    /// The Error type that can occur in translating the object.
    type Error;

    /// Attaches the bytestream representation of self to the provided bytestream.
    fn to_bytestream(&self, bytestream: &mut impl Write) -> Result<(), Self::Error>;

    /// Attaches the bytestream representation of self to an empty bytestream.
    fn to_buffer(&self) -> Result<Vec<u8>, Self::Error> {
        let mut buffer = Vec::new();
        self.to_bytestream(&mut buffer)?;
        Ok(buffer)
    }
}

/// The `FromBytestream` trait allows for the construction of Self from a
/// bytestream of a source.
pub trait FromBytestream: Sized {
    /// The Error type that can occur in constructing the object.
    type Error;

    /// Constructs an instance of Self from the given bytestream, advancing
    /// the stream in the process.
    fn from_bytestream(bytestream: &mut Cursor<impl AsRef<[u8]>>) -> Result<Self, Self::Error>;

    /// Constructs an instance of Self from the given buffer, consuming
    /// the buffer in the process.
    fn from_buffer(buffer: impl AsRef<[u8]>) -> Result<Self, Self::Error> {
        let mut cursor = Cursor::new(buffer);
        Self::from_bytestream(&mut cursor)
    }
}
