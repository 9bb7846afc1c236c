use std::io::{self, Write};

/// Where delivery writes headers and body bytes.
///
/// Headers set before [`ResponseSink::flush`] are committed by it; body bytes
/// written before the flush sit in a buffer that [`ResponseSink::clear_buffer`]
/// discards. A write error means the client is gone.
pub trait ResponseSink {
    fn set_header(&mut self, name: &'static str, value: String);
    fn clear_buffer(&mut self);
    fn flush(&mut self) -> io::Result<()>;
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// `io::Write` view over a sink's body.
pub struct BodyWriter<'a, S: ResponseSink + ?Sized>(pub &'a mut S);

impl<S: ResponseSink + ?Sized> Write for BodyWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_body(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// Sink that keeps the whole response in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferedResponse {
    headers: Vec<(&'static str, String)>,
    pending: Vec<u8>,
    body: Vec<u8>,
    flushed: bool,
    body_writes: usize,
}

impl BufferedResponse {
    pub fn new() -> Self { Self::default() }

    /// Headers in the order they were set.
    pub fn headers(&self) -> &[(&'static str, String)] { &self.headers }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    pub fn header_names(&self) -> Vec<&'static str> {
        self.headers.iter().map(|(n, _)| *n).collect()
    }

    pub fn body(&self) -> &[u8] { &self.body }

    pub fn is_flushed(&self) -> bool { self.flushed }

    /// Number of `write_body` calls after the flush.
    pub fn body_writes(&self) -> usize { self.body_writes }
}

impl ResponseSink for BufferedResponse {
    fn set_header(&mut self, name: &'static str, value: String) {
        self.headers.push((name, value));
    }

    fn clear_buffer(&mut self) {
        self.pending.clear();
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushed = true;
        self.body.append(&mut self.pending);
        Ok(())
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.flushed {
            self.body.extend_from_slice(bytes);
            self.body_writes += 1;
        } else {
            self.pending.extend_from_slice(bytes);
        }
        Ok(())
    }
}
