use std::fmt;

use courier_protocol::Record;
use log::info;

/// A submission unit of records. Members are delivered independently; a batch is
/// never an atomic commit.
#[derive(Debug)]
pub struct Batch<R> {
    records: Vec<R>,
}

impl<R: Record> Batch<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn first_id(&self) -> Option<&str> {
        self.records.first().map(Record::id)
    }

    pub fn last_id(&self) -> Option<&str> {
        self.records.last().map(Record::id)
    }

    /// `first..last` id range, for diagnostics.
    pub fn range(&self) -> BatchRange<'_> {
        BatchRange {
            first: self.first_id(),
            last: self.last_id(),
        }
    }
}

pub struct BatchRange<'a> {
    first: Option<&'a str>,
    last: Option<&'a str>,
}

impl fmt::Display for BatchRange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.first, self.last) {
            (Some(first), Some(last)) => write!(f, "{first}..{last}"),
            _ => f.write_str("<empty>"),
        }
    }
}

/// Groups a record stream into batches of a fixed target size.
pub struct BatchAccumulator<R> {
    batch_size: usize,
    current: Vec<R>,
    observed: usize,
}

impl<R: Record> BatchAccumulator<R> {
    /// A `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            current: Vec::with_capacity(batch_size),
            observed: 0,
        }
    }

    /// Add a record; returns the batch it completed, if any.
    pub fn push(&mut self, record: R) -> Option<Batch<R>> {
        self.observed += 1;
        self.current.push(record);

        if self.current.len() >= self.batch_size {
            let full = std::mem::replace(&mut self.current, Vec::with_capacity(self.batch_size));
            return Some(Batch::new(full));
        }
        None
    }

    /// The trailing partial batch, if any records are left over.
    pub fn finish(self) -> Option<Batch<R>> {
        if self.current.is_empty() {
            None
        } else {
            Some(Batch::new(self.current))
        }
    }

    /// Records pushed so far.
    pub fn observed(&self) -> usize {
        self.observed
    }
}

/// A submit failure together with how far the source had been consumed.
#[derive(Debug)]
pub struct Aborted<E> {
    pub observed: usize,
    pub error: E,
}

/// Pull every record from `records`, hand each completed batch to `submit`, and
/// return the number of records pulled.
///
/// Every `log_interval` records a progress line naming `destination` is logged
/// (0 disables it). The first submit error stops consumption of the source.
pub fn accumulate<R, I, F, E>(
    records: I,
    batch_size: usize,
    log_interval: usize,
    destination: &str,
    mut submit: F,
) -> Result<usize, Aborted<E>>
where
    R: Record,
    I: IntoIterator<Item = R>,
    F: FnMut(Batch<R>) -> Result<(), E>,
{
    let mut acc = BatchAccumulator::new(batch_size);

    for record in records {
        let full = acc.push(record);
        let observed = acc.observed();

        if let Some(batch) = full {
            submit(batch).map_err(|error| Aborted { observed, error })?;
        }
        if log_interval > 0 && observed % log_interval == 0 {
            info!("Queued {observed} records into {destination}");
        }
    }

    let observed = acc.observed();
    if let Some(batch) = acc.finish() {
        submit(batch).map_err(|error| Aborted { observed, error })?;
    }

    Ok(observed)
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
