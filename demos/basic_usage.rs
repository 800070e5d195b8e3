//! Basic usage examples for bytes-map.

use bytes_map::{BytesToBytesMap, Config, HeapAllocator, MemoryAllocator, RawAllocator};

fn main() {
    example_heap();
    example_raw();
    example_small_pages();
}

fn fill_and_query(allocator: &dyn MemoryAllocator) {
    let mut map = BytesToBytesMap::new(allocator, 64).unwrap();

    // Insert data
    let users: [(&[u8], &[u8]); 3] = [
        (b"user:1001", b"alice"),
        (b"user:1002", b"bob"),
        (b"user:1003", b"carol"),
    ];
    for (key, value) in users {
        let mut loc = map.lookup(key);
        if !loc.is_defined() {
            loc.store_key_and_value(key, value).unwrap();
        }
    }

    // Lookups
    let loc = map.lookup(b"user:1001");
    println!(
        "user:1001 = {:?} (key at {:?}, value at {:?})",
        loc.value().map(String::from_utf8_lossy),
        loc.key_address(),
        loc.value_address()
    );
    println!("user:9999 defined: {}", map.lookup(b"user:9999").is_defined());
    println!("Count: {}\n", map.len());
    map.free();
}

fn example_heap() {
    println!("=== Heap-backed map ===\n");
    let allocator = HeapAllocator::new();
    fill_and_query(&allocator);
    println!("Allocator after free: {:?}\n", allocator.stats());
}

fn example_raw() {
    println!("=== Raw-memory map ===\n");
    let allocator = RawAllocator::new();
    fill_and_query(&allocator);
    println!("Allocator after free: {:?}\n", allocator.stats());
}

fn example_small_pages() {
    println!("=== Growth with 4 KB pages ===\n");
    let allocator = RawAllocator::new();
    let config = Config {
        page_size: 4096,
        ..Config::default()
    };
    let mut map = BytesToBytesMap::with_config(&allocator, config).unwrap();
    for i in 0..10_000u32 {
        let key = format!("key:{i:08}");
        let value = i.to_le_bytes();
        map.lookup(key.as_bytes())
            .store_key_and_value(key.as_bytes(), &value)
            .unwrap();
    }

    let stats = map.memory_usage();
    println!("Keys: {}", stats.num_keys);
    println!("Index capacity: {}", map.capacity());
    println!("Pages: {}", stats.num_pages);
    println!("Index bytes: {}", stats.index_bytes);
    println!("Page bytes: {} ({} used)", stats.page_bytes, stats.used_page_bytes);
    println!("Bytes per key: {:.1}", stats.bytes_per_key);
}
