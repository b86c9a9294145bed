//! Fuzz target for the job queue list.
//!
//! Replays an arbitrary operation sequence against `LinkedList` and a
//! `VecDeque` model; both must agree after every step.

#![no_main]

use bls_multithread::LinkedList;
use libfuzzer_sys::fuzz_target;
use std::collections::VecDeque;

#[derive(Debug, arbitrary::Arbitrary)]
enum Op {
    Push(u8),
    Unshift(u8),
    Pop,
    Shift,
    DeleteFirst(u8),
    DeleteLast(u8),
    Clear,
}

fuzz_target!(|ops: Vec<Op>| {
    let mut list = LinkedList::new();
    let mut model = VecDeque::new();

    for op in ops {
        match op {
            Op::Push(v) => {
                list.push(v);
                model.push_back(v);
            }
            Op::Unshift(v) => {
                list.unshift(v);
                model.push_front(v);
            }
            Op::Pop => assert_eq!(list.pop(), model.pop_back()),
            Op::Shift => assert_eq!(list.shift(), model.pop_front()),
            Op::DeleteFirst(v) => {
                let expected = model.iter().position(|x| *x == v).map(|i| model.remove(i));
                assert_eq!(list.delete_first(&v), expected.is_some());
            }
            Op::DeleteLast(v) => {
                let expected = model.iter().rposition(|x| *x == v).map(|i| model.remove(i));
                assert_eq!(list.delete_last(&v), expected.is_some());
            }
            Op::Clear => {
                list.clear();
                model.clear();
            }
        }

        assert_eq!(list.len(), model.len());
        assert_eq!(list.first(), model.front());
        assert_eq!(list.last(), model.back());
    }

    assert!(list.iter().eq(model.iter()));
});
