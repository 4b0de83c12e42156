//! Randomized check that query membership always equals a plain re-evaluation
//! of every query against every tracked entity's current component set.

use std::collections::BTreeMap;

use ecs_component::{Component, Entity, Operator, QueryDescriptor};
use ecs_world::{QueryId, World};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

macro_rules! components {
    ($($name:ident),*) => {
        $(
            #[derive(Debug, Default)]
            struct $name;
            impl Component for $name {}
        )*
    };
}

components!(A, B, C, D, E);

const TYPES: usize = 5;

/// Run `$body` with `$T` bound to the component type at index `$ty`.
macro_rules! with_type {
    ($ty:expr, $T:ident => $body:expr) => {
        match $ty {
            0 => {
                type $T = A;
                $body
            }
            1 => {
                type $T = B;
                $body
            }
            2 => {
                type $T = C;
                $body
            }
            3 => {
                type $T = D;
                $body
            }
            _ => {
                type $T = E;
                $body
            }
        }
    };
}

const OPERATORS: [Operator; 6] = [
    Operator::Read,
    Operator::Write,
    Operator::Add,
    Operator::Remove,
    Operator::Change,
    Operator::Not,
];

/// Expected state of one tracked entity.
#[derive(Debug, Clone, Copy, Default)]
struct Model {
    has: [bool; TYPES],
    removed: bool,
}

struct Harness {
    world: World,
    rng: StdRng,
    model: BTreeMap<Entity, Model>,
    queries: Vec<(QueryId, Vec<(Operator, usize)>)>,
}

impl Harness {
    fn new(seed: u64) -> Self {
        Self {
            world: World::new(),
            rng: StdRng::seed_from_u64(seed),
            model: BTreeMap::new(),
            queries: Vec::new(),
        }
    }

    fn random_shape(&mut self) -> Vec<(Operator, usize)> {
        let len = self.rng.gen_range(1..=3);
        (0..len)
            .map(|_| {
                let op = OPERATORS[self.rng.gen_range(0..OPERATORS.len())];
                (op, self.rng.gen_range(0..TYPES))
            })
            .collect()
    }

    fn add_query(&mut self) {
        let shape = self.random_shape();
        let descriptor = shape.iter().fold(QueryDescriptor::new(), |q, &(op, ty)| {
            with_type!(ty, T => q.with::<T>(op))
        });
        let id = self.world.query(&descriptor);
        self.queries.push((id, shape));
    }

    fn pick_entity(&mut self) -> Option<Entity> {
        if self.model.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.model.len());
        self.model.keys().nth(index).copied()
    }

    fn step(&mut self) {
        match self.rng.gen_range(0..100) {
            0..=14 => {
                let e = self.world.create_entity();
                self.model.insert(e, Model::default());
            }
            15..=54 => {
                let Some(e) = self.pick_entity() else { return };
                let ty = self.rng.gen_range(0..TYPES);
                let result = with_type!(ty, T => self.world.add_component::<T>(e));
                let entry = self.model.get_mut(&e).unwrap();
                if entry.removed {
                    assert!(result.is_err());
                } else {
                    assert_eq!(result.unwrap(), !entry.has[ty]);
                    entry.has[ty] = true;
                }
            }
            55..=84 => {
                let Some(e) = self.pick_entity() else { return };
                let ty = self.rng.gen_range(0..TYPES);
                let immediate = self.rng.gen_bool(0.3);
                let result = with_type!(ty, T => self.world.remove_component::<T>(e, immediate));
                let removed = result.unwrap();
                let entry = self.model.get_mut(&e).unwrap();
                assert_eq!(removed, entry.has[ty]);
                entry.has[ty] = false;
            }
            85..=92 => {
                let Some(e) = self.pick_entity() else { return };
                let immediate = self.rng.gen_bool(0.3);
                let result = self.world.remove_entity(e, immediate);
                let entry = self.model.get_mut(&e).unwrap();
                if entry.removed {
                    assert!(result.is_err());
                } else {
                    result.unwrap();
                    entry.removed = true;
                    entry.has = [false; TYPES];
                    if immediate {
                        self.model.remove(&e);
                    }
                }
            }
            93..=96 => self.add_query(),
            _ => {
                self.world.run();
                self.model.retain(|_, m| !m.removed);
            }
        }
    }

    fn verify(&mut self) {
        assert_eq!(self.world.entities().count(), self.model.len());
        for i in 0..self.queries.len() {
            let (id, shape) = self.queries[i].clone();
            let expected: Vec<Entity> = self
                .model
                .iter()
                .filter(|(_, m)| shape.iter().all(|&(op, ty)| op.accepts(m.has[ty])))
                .map(|(e, _)| *e)
                .collect();

            for e in self.model.keys() {
                assert_eq!(
                    self.world.queries().contains(id, *e),
                    expected.contains(e),
                    "{e} in query {:?}",
                    self.world.queries().key(id)
                );
            }
            assert_eq!(self.world.queries().len(id), expected.len());

            // Only rebuild now and then so dirty tracking is exercised too.
            if self.rng.gen_bool(0.2) {
                let results = self.world.query_results(id);
                assert_eq!(results.entities(), expected.as_slice());
            }
        }
    }
}

#[test]
fn test_membership_matches_model() {
    for seed in 0..8 {
        let mut harness = Harness::new(seed);
        for _ in 0..4 {
            harness.add_query();
        }
        for _ in 0..600 {
            harness.step();
            harness.verify();
        }
    }
}

#[test]
fn test_query_created_late_sees_existing_entities() {
    let mut harness = Harness::new(99);
    for _ in 0..200 {
        harness.step();
    }
    for _ in 0..6 {
        harness.add_query();
    }
    harness.verify();
}
