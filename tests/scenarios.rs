//! Concrete end-to-end scenarios (§8).

use deltaview::checkpoint::{restore_source_offset, CheckpointStore, OffsetSource, OperatorSnapshot};
use deltaview::indexed::IndexedZSet;
use deltaview::operator::{fixed_point, AntiJoin, Count, Join, LeftOuterJoin, Sum, Tolerance};
use deltaview::zset::ZSet;

fn words_of(z: &ZSet<String, i64>) -> ZSet<String, i64> {
    z.flat_map(|line| {
        line.split_whitespace()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
    })
}

fn word_index(words: &ZSet<String, i64>) -> IndexedZSet<String, (), i64> {
    IndexedZSet::group_by(|w: &String| (w.clone(), ()), words)
}

#[test]
fn word_count_scenario() {
    let mut count = Count::<String, (), i64>::new();

    let lines1: ZSet<String, i64> = ZSet::from_tuples(vec![("hello world".to_string(), 1)]);
    let out1 = count.step(&word_index(&words_of(&lines1)));

    let lines2: ZSet<String, i64> = ZSet::from_tuples(vec![("hello dbsp".to_string(), 1)]);
    let out2 = count.step(&word_index(&words_of(&lines2)));

    let after_step2 = out1.add(&out2);
    assert_eq!(after_step2.get_weight(&("hello".to_string(), 2)), 1);
    assert_eq!(after_step2.get_weight(&("world".to_string(), 1)), 1);
    assert_eq!(after_step2.get_weight(&("dbsp".to_string(), 1)), 1);

    let lines3: ZSet<String, i64> = ZSet::from_tuples(vec![("hello world".to_string(), -1)]);
    let out3 = count.step(&word_index(&words_of(&lines3)));

    let after_step3 = after_step2.add(&out3);
    assert_eq!(after_step3.get_weight(&("hello".to_string(), 1)), 1);
    assert_eq!(after_step3.get_weight(&("dbsp".to_string(), 1)), 1);
    assert_eq!(after_step3.get_weight(&("world".to_string(), 1)), 0);
    assert_eq!(after_step3.get_weight(&("hello".to_string(), 2)), 0);
}

#[test]
fn inner_join_with_update_scenario() {
    let mut join = Join::<i64, (i64, i64), String, i64>::new();
    let mut revenue = Sum::<String, i64>::new();

    let orders1 = IndexedZSet::from_zset(&ZSet::from_tuples(vec![
        ((101, (1, 100)), 1),
        ((102, (2, 200)), 1),
    ]));
    let customers1 = IndexedZSet::from_zset(&ZSet::from_tuples(vec![
        ((101, "Alice".to_string()), 1),
        ((102, "Bob".to_string()), 1),
    ]));

    let joined1 = join.step(&orders1, &customers1);
    let by_name1 = joined1.map_keys(|(_k, (_oid, amt), name)| (name.clone(), *amt));
    let out1 = revenue.step(&IndexedZSet::from_zset(&by_name1));
    assert_eq!(out1.get_weight(&("Alice".to_string(), 100)), 1);
    assert_eq!(out1.get_weight(&("Bob".to_string(), 200)), 1);

    let orders_delta = IndexedZSet::from_zset(&ZSet::from_tuples(vec![
        ((101, (1, 100)), -1),
        ((101, (1, 150)), 1),
    ]));
    let customers_delta = IndexedZSet::empty();

    let joined2 = join.step(&orders_delta, &customers_delta);
    let by_name2 = joined2.map_keys(|(_k, (_oid, amt), name)| (name.clone(), *amt));
    let out2 = revenue.step(&IndexedZSet::from_zset(&by_name2));
    assert_eq!(out2.get_weight(&("Alice".to_string(), 100)), -1);
    assert_eq!(out2.get_weight(&("Alice".to_string(), 150)), 1);
}

#[test]
fn left_outer_join_scenario() {
    let mut lo = LeftOuterJoin::<i64, &'static str, i64, i64>::new();
    let left = IndexedZSet::from_zset(&ZSet::from_tuples(vec![
        ((1, "a"), 1),
        ((2, "b"), 1),
        ((3, "c"), 1),
    ]));
    let right = IndexedZSet::from_zset(&ZSet::from_tuples(vec![((1, 10), 1), ((2, 20), 1)]));

    let out = lo.step(&left, &right);
    assert_eq!(out.get_weight(&(1, "a", Some(10))), 1);
    assert_eq!(out.get_weight(&(2, "b", Some(20))), 1);
    assert_eq!(out.get_weight(&(3, "c", None)), 1);
}

#[test]
fn anti_join_with_later_match_scenario() {
    let mut anti = AntiJoin::<i64, &'static str, (), i64>::new();
    let left = IndexedZSet::from_zset(&ZSet::from_tuples(vec![
        ((1, "a"), 1),
        ((2, "b"), 1),
        ((3, "c"), 1),
    ]));
    let right = IndexedZSet::from_zset(&ZSet::from_tuples(vec![((1, ()), 1)]));
    let out1 = anti.step(&left, &right);
    assert_eq!(out1.get_weight(&(2, "b")), 1);
    assert_eq!(out1.get_weight(&(3, "c")), 1);
    assert_eq!(out1.get_weight(&(1, "a")), 0);

    let right_delta = IndexedZSet::from_zset(&ZSet::from_tuples(vec![((2, ()), 1)]));
    let out2 = anti.step(&IndexedZSet::empty(), &right_delta);
    assert_eq!(out2.get_weight(&(2, "b")), -1);
}

#[test]
fn transitive_closure_scenario() {
    let edges: ZSet<(i64, i64), i64> =
        ZSet::from_tuples(vec![((1, 2), 1), ((2, 3), 1), ((3, 4), 1)]);

    let (closure, term) = fixed_point(edges.clone(), 3, Tolerance::default(), |reach| {
        let mut extended = Vec::new();
        for (a, b) in reach.consolidated() {
            for (c, d) in edges.consolidated() {
                if b == c {
                    extended.push(((a, d), 1i64));
                }
            }
        }
        reach.union(&ZSet::from_tuples(extended)).distinct()
    });

    assert!(matches!(
        term,
        deltaview::operator::Termination::Converged { iterations } if iterations <= 3
    ));
    for pair in [(1, 2), (2, 3), (3, 4), (1, 3), (2, 4), (1, 4)] {
        assert_eq!(closure.get_weight(&pair), 1);
    }
}

struct IntSource {
    next: u64,
    emitted: Vec<u64>,
}

impl OffsetSource for IntSource {
    fn get_offset(&self) -> u64 {
        self.next
    }
    fn seek(&mut self, offset: u64) {
        self.next = offset;
    }
}

impl IntSource {
    fn emit_through(&mut self, up_to: u64) {
        while self.next < up_to {
            self.next += 1;
            self.emitted.push(self.next);
        }
    }
}

#[test]
fn checkpoint_restore_with_source_offset_scenario() {
    const SOURCE_OP_ID: u64 = 1;

    let dir = tempfile::tempdir().unwrap();
    let mut store = CheckpointStore::open(dir.path()).unwrap();
    let mut source = IntSource { next: 0, emitted: Vec::new() };

    source.emit_through(5);
    store
        .checkpoint(
            1,
            vec![OperatorSnapshot {
                op_id: SOURCE_OP_ID,
                bytes: source.get_offset().to_le_bytes().to_vec(),
            }],
        )
        .unwrap();

    source.emit_through(7);
    // Crash here: no second checkpoint is ever written.
    drop(source);

    let mut resumed = IntSource { next: 0, emitted: Vec::new() };
    restore_source_offset(&store, &mut resumed, SOURCE_OP_ID).unwrap();
    assert_eq!(resumed.get_offset(), 5);

    resumed.emit_through(10);
    assert_eq!(resumed.emitted, vec![6, 7, 8, 9, 10]);
}
