#![feature(test)]
extern crate ceit;
extern crate test;
#[macro_use]
extern crate trackable;

use ceit::Chunk;
use test::Bencher;

const CHUNK_SIZE: usize = 64 * 1024 * 1024;

#[bench]
fn allocate_and_release(b: &mut Bencher) {
    let mut chunk = track_try_unwrap!(Chunk::create("bench", CHUNK_SIZE));
    b.iter(|| {
        let block = track_try_unwrap!(chunk.allocate(128, "foo"));
        track_try_unwrap!(chunk.release(block));
    });
}

#[bench]
fn allocate_and_release_by_name(b: &mut Bencher) {
    let mut chunk = track_try_unwrap!(Chunk::create("bench", CHUNK_SIZE));
    b.iter(|| {
        track_try_unwrap!(chunk.allocate(128, "foo"));
        track_try_unwrap!(chunk.release_by_name("foo"));
    });
}

#[bench]
fn allocate_among_fragments(b: &mut Bencher) {
    let mut chunk = track_try_unwrap!(Chunk::create("bench", CHUNK_SIZE));
    let mut handles = Vec::new();
    for i in 0..1000 {
        handles.push(track_try_unwrap!(chunk.allocate(16 + i % 64, "fragment")));
    }
    for block in handles.into_iter().step_by(2) {
        track_try_unwrap!(chunk.release(block));
    }
    b.iter(|| {
        let block = track_try_unwrap!(chunk.allocate(40, "foo"));
        track_try_unwrap!(chunk.release(block));
    });
}

#[bench]
fn write_and_read_small(b: &mut Bencher) {
    let mut chunk = track_try_unwrap!(Chunk::create("bench", CHUNK_SIZE));
    let block = track_try_unwrap!(chunk.allocate(64, "foo"));
    let mut buf = [0; 32];
    b.iter(|| {
        track_try_unwrap!(chunk.write(block, b"0123456789abcdef0123456789abcdef"));
        track_try_unwrap!(chunk.read(block, &mut buf));
    });
}

#[bench]
fn write_text_small(b: &mut Bencher) {
    let mut chunk = track_try_unwrap!(Chunk::create("bench", CHUNK_SIZE));
    let block = track_try_unwrap!(chunk.allocate(64, "foo"));
    b.iter(|| track_try_unwrap!(chunk.write_text(block, "HI0099")));
}
