//! Transfer progress reporting

/// Observer for image transfers
///
/// Large images are sent as several sparse pieces; `index` is zero-based and
/// `count` is the number of pieces for the current partition.
pub trait TransferProgress {
    /// A piece of `bytes` bytes is about to be sent to `label`
    fn started(&mut self, label: &str, index: usize, count: usize, bytes: u64);

    /// The piece was written
    fn finished(&mut self, label: &str);
}

/// Progress reporter that reports nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn started(&mut self, _label: &str, _index: usize, _count: usize, _bytes: u64) {}

    fn finished(&mut self, _label: &str) {}
}
