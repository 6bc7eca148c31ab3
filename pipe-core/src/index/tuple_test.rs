use super::*;
use std::cmp::Ordering;

#[test]
fn shorter_tuple_precedes_longer_tuple() {
    let short = TotalOrderSumTuple::new(vec![100, 100]);
    let long = TotalOrderSumTuple::new(vec![0, 0, 1]);

    assert!(short < long, "expected {} to precede {} based on length", short, long);
    assert!(TotalOrderSumTuple::default() < TotalOrderSumTuple::new(vec![0]), "expected the empty tuple to sort first");
}

#[test]
fn equal_length_tuples_compare_from_last_element() {
    let a = TotalOrderSumTuple::new(vec![9, 1]);
    let b = TotalOrderSumTuple::new(vec![0, 2]);
    let c = TotalOrderSumTuple::new(vec![1, 2]);

    assert!(a < b, "expected the last element to be the most significant, got {} >= {}", a, b);
    assert!(b < c, "expected ties on the last element to fall through to earlier elements, got {} >= {}", b, c);
    assert_eq!(c.cmp(&c.clone()), Ordering::Equal);
}

#[test]
fn sum_pads_shorter_tuples_with_zeros() {
    let tuples = vec![
        TotalOrderSumTuple::new(vec![1]),
        TotalOrderSumTuple::new(vec![2, 3, 4]),
        TotalOrderSumTuple::new(vec![5, 6]),
    ];

    let sum = TotalOrderSumTuple::sum(&tuples);

    assert_eq!(sum.values(), &[8, 9, 4], "unexpected tuple sum {}", sum);
}

#[test]
fn sum_of_nothing_is_the_empty_tuple() {
    let sum = TotalOrderSumTuple::sum(&[]);
    assert!(sum.is_empty(), "expected empty tuple, got {}", sum);

    let single = TotalOrderSumTuple::new(vec![7, 0, 3]);
    assert_eq!(TotalOrderSumTuple::sum([&single]), single);
}
