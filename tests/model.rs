use std::collections::HashMap;

use rand::{thread_rng, Rng};

use intent_log::{BincodeReader, IntentLog, PageContainer, PageReference, NULL_ID_LONG};

mod common;

use common::{container, with_capacity, Page};

const REFERENCES: usize = 24;
const OPS: usize = 2000;

fn index_of(refs: &[PageReference], reference: &PageReference) -> usize {
    refs.iter()
        .position(|r| r == reference)
        .expect("resident reference was never handed to the log")
}

fn check(
    log: &IntentLog<Page>,
    refs: &[PageReference],
    model: &HashMap<usize, PageContainer<Page>>,
    order: &[usize],
) {
    assert!(log.used_entries() <= log.capacity());

    // resident entries are always the most recently inserted ones
    let resident: Vec<usize> = log.iter().map(|(r, _)| index_of(refs, r)).collect();
    assert_eq!(resident, order[order.len() - resident.len()..]);

    assert_eq!(log.used_entries() + log.spilled_entries(), model.len());

    for (i, reference) in refs.iter().enumerate() {
        let resident = log.contains(reference);

        if !model.contains_key(&i) {
            assert!(!resident);
            continue;
        }

        let persistent_log_key = reference.persistent_log_key();
        let spilled = persistent_log_key != NULL_ID_LONG
            && log.translator().forward(reference.log_key()) == Some(persistent_log_key)
            && log.translator().inverse(persistent_log_key) == Some(reference.log_key());

        assert!(
            resident != spilled,
            "reference {} resident: {} spilled: {}",
            i,
            resident,
            spilled
        );
    }
}

fn run(capacity: usize) {
    with_capacity(capacity, |log| {
        let mut rng = thread_rng();

        let refs: Vec<PageReference> = (0..REFERENCES).map(|_| PageReference::new()).collect();
        let mut model: HashMap<usize, PageContainer<Page>> = HashMap::new();
        // least recently inserted first
        let mut order: Vec<usize> = vec![];

        for op in 0..OPS {
            if rng.gen_ratio(1, 100) {
                let dropped: Vec<usize> = order
                    .iter()
                    .copied()
                    .filter(|j| log.contains(&refs[*j]))
                    .collect();

                // resident entries are dropped, spilled ones stay
                log.clear();

                for j in dropped {
                    model.remove(&j);
                    order.retain(|k| *k != j);
                }

                check(log, &refs, &model, &order);
                continue;
            }

            let i = rng.gen_range(0..REFERENCES);
            let reference = &refs[i];

            match rng.gen_range(0..5) {
                0 | 1 => {
                    let c = container(op as u64);
                    log.put(reference, c.clone()).unwrap();
                    model.insert(i, c);
                    order.retain(|j| *j != i);
                    order.push(i);
                }
                2 => {
                    let was_resident = log.contains(reference);
                    let got = log.get(reference, &BincodeReader).unwrap().cloned();
                    assert_eq!(got.as_ref(), model.get(&i));

                    if got.is_some() && !was_resident {
                        order.retain(|j| *j != i);
                        order.push(i);
                    }
                }
                3 => {
                    let was_resident = log.contains(reference);
                    let record = vec![op as u8; 3];

                    match log.get_mut(reference, &BincodeReader).unwrap() {
                        Some(c) => {
                            c.modified_mut().unwrap().records.push(record.clone());

                            let expected = model.get_mut(&i).unwrap();
                            expected.modified_mut().unwrap().records.push(record);

                            if !was_resident {
                                order.retain(|j| *j != i);
                                order.push(i);
                            }
                        }
                        None => assert!(!model.contains_key(&i)),
                    }
                }
                4 => {
                    log.remove(reference);
                    model.remove(&i);
                    order.retain(|j| *j != i);
                }
                _ => unreachable!(),
            }

            check(log, &refs, &model, &order);
        }

        for (i, reference) in refs.iter().enumerate() {
            let got = log.get(reference, &BincodeReader).unwrap().cloned();
            assert_eq!(got.as_ref(), model.get(&i));
        }

        log::info!(
            "model run with capacity {} finished with {:?}",
            capacity,
            log.overflow_stats()
        );
    });
}

#[test]
fn randomized_against_model() {
    for capacity in [1, 3, 8, REFERENCES] {
        run(capacity);
    }
}
