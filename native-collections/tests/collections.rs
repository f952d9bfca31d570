//! Cross-container scenarios exercised through the public API only.

use std::io::{Read, Write};

use native_collections::{
    CollectionError, Dictionary, HashSet, List, MemoryReader, MemoryStream, MemoryWriter,
    PriorityQueue, SortedList, SortedSet,
};

#[test]
fn dictionary_add_remove_get() {
    let mut map: Dictionary<i32, i32> = Dictionary::with_capacity(4);
    map.add(1, 10).unwrap();
    map.add(2, 20).unwrap();
    assert_eq!(map.add(1, 30), Err(CollectionError::DuplicateKey));
    assert_eq!(map.remove(&1), Some(10));
    assert_eq!(map.get(&1), None);
    assert_eq!(map.get(&2), Some(&20));
}

#[test]
fn ensured_capacity_never_moves_the_entries() {
    let mut map: Dictionary<u64, String> = Dictionary::new();
    let capacity = map.ensure_capacity(1_000).unwrap();
    assert!(capacity >= 1_000);
    let entries = map.entries_ptr();
    for i in 0..capacity as u64 {
        map.add(i, i.to_string()).unwrap();
    }
    assert_eq!(map.entries_ptr(), entries);

    let mut set = HashSet::with_capacity(64);
    let entries = set.entries_ptr();
    set.extend(0..64u32);
    assert_eq!(set.entries_ptr(), entries);
}

#[test]
fn priority_queue_pops_lowest_first() {
    let mut queue = PriorityQueue::new();
    queue.enqueue("a", 5);
    queue.enqueue("b", 1);
    queue.enqueue("c", 3);
    let order: Vec<_> = std::iter::from_fn(|| queue.try_dequeue().map(|(e, _)| e)).collect();
    assert_eq!(order, ["b", "c", "a"]);
}

#[test]
fn ordered_containers_agree() {
    let mut set = SortedSet::new().unwrap();
    let mut list = SortedList::new();
    for k in [42u32, 7, 19, 3, 88, 7, 19] {
        set.add(k);
        list.insert(k, k * 2);
    }
    let from_set: Vec<u32> = set.iter().copied().collect();
    assert_eq!(from_set, list.keys());
    assert_eq!(set.min(), list.first().map(|(k, _)| k));
    assert_eq!(set.max(), list.last().map(|(k, _)| k));
}

#[test]
fn stream_carries_a_framed_record() {
    let mut frame = [0u8; 32];
    let mut writer = MemoryWriter::new(&mut frame);
    writer.write(3u16).unwrap();
    writer.write_slice(&[10u32, 20, 30]).unwrap();
    let len = writer.position();

    let mut stream = MemoryStream::new();
    stream.write_all(&frame[..len]).unwrap();
    stream.set_position(0);
    let mut copy = Vec::new();
    stream.read_to_end(&mut copy).unwrap();

    let mut reader = MemoryReader::new(&copy);
    let count = reader.read::<u16>().unwrap();
    let mut values: List<u32> = List::new();
    for _ in 0..count {
        values.push(reader.read().unwrap());
    }
    assert_eq!(values.as_slice(), &[10, 20, 30]);
    assert_eq!(reader.remaining(), 0);
}
