use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

pub struct HistoryEntry<Data> {
    timestamp: Instant,
    data: Data,
    times_found: usize,
}

// TODO store hashes instead of full entries once Data: Hash is acceptable,
// so long messages don't sit in memory for the whole ttl
pub struct History<Channel, Data> {
    channels: HashMap<Channel, VecDeque<HistoryEntry<Data>>>,
    ttl: Duration,
}

impl<Channel, Data> History<Channel, Data>
where
    Channel: Hash + Eq,
    Data: Eq,
{
    pub fn new(channels: Vec<Channel>, ttl: Duration) -> History<Channel, Data> {
        History {
            channels: channels.into_iter().map(|c| (c, VecDeque::new())).collect(),
            ttl,
        }
    }

    /// Adds item to a channel's queue. None if the channel is not tracked.
    pub fn push(&mut self, channel: &Channel, data: Data) -> Option<()> {
        self.channels.get_mut(channel).map(|queue| {
            queue.push_back(HistoryEntry {
                timestamp: Instant::now(),
                data,
                times_found: 0,
            })
        })
    }

    /// Checks if a given message is present in the history.
    /// All messages that are too old are removed from the queue.
    ///
    /// The number of times this message was searched for and found is returned,
    /// 0 meaning it is not in the history at all.
    pub fn contains(&mut self, channel: &Channel, data: &Data) -> Option<usize> {
        let ttl = self.ttl;
        self.channels.get_mut(channel).map(|queue| {
            let now = Instant::now();
            while let Some(HistoryEntry { timestamp, .. }) = queue.front() {
                if *timestamp + ttl < now {
                    let _ = queue.pop_front().unwrap();
                } else {
                    break;
                }
            }

            queue.iter_mut()
                .find(|d| d.data == *data)
                .map(|entry| {
                    entry.times_found += 1;
                    entry.times_found
                })
                .unwrap_or(0)
        })
    }
}
