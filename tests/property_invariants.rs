use std::collections::BTreeMap;
use std::num::NonZeroU32;

use proptest::prelude::*;
use rust_decimal::Decimal;

use cartstore::{
    core::{cart::CartStore, favorites::FavoritesStore, store::StoreError},
    line::CartLineDraft,
    types::UserKey,
};

#[derive(Debug, Clone)]
enum Action {
    Switch { user: u8 },
    Upsert { product: u8, qty: u8 },
    Remove { product: u8 },
    SetQty { product: u8, qty: u8 },
    Clear,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..4).prop_map(|user| Action::Switch { user }),
        (0u8..8, 1u8..5).prop_map(|(product, qty)| Action::Upsert { product, qty }),
        (0u8..8).prop_map(|product| Action::Remove { product }),
        (0u8..8, 0u8..5).prop_map(|(product, qty)| Action::SetQty { product, qty }),
        Just(Action::Clear),
    ]
}

fn user_key(idx: u8) -> UserKey {
    if idx == 0 {
        UserKey::guest()
    } else {
        UserKey::new(format!("user-{idx}"))
    }
}

fn product(idx: u8) -> String {
    format!("P{idx}")
}

fn draft(product_idx: u8, qty: u8) -> CartLineDraft {
    CartLineDraft::new(product(product_idx), "item", Decimal::from(3))
        .with_quantity(NonZeroU32::new(u32::from(qty)).expect("qty >= 1"))
}

type Model = BTreeMap<UserKey, BTreeMap<String, u32>>;

fn observed(cart: &CartStore) -> BTreeMap<String, u32> {
    cart.lines()
        .iter()
        .map(|l| (l.product_id.clone(), l.quantity))
        .collect()
}

proptest! {
    #[test]
    fn partitions_match_an_independent_per_user_model(actions in prop::collection::vec(action_strategy(), 1..150)) {
        let mut cart = CartStore::new();
        let mut model = Model::new();
        let mut active = UserKey::guest();

        for action in actions {
            match action {
                Action::Switch { user } => {
                    active = user_key(user);
                    cart.set_active_user(active.clone());
                }
                Action::Upsert { product: p, qty } => {
                    cart.upsert_line(draft(p, qty)).expect("upsert");
                    *model.entry(active.clone()).or_default().entry(product(p)).or_default() += u32::from(qty);
                }
                Action::Remove { product: p } => {
                    let expected = model.entry(active.clone()).or_default().remove(&product(p)).is_some();
                    prop_assert_eq!(cart.remove_line(&product(p)), expected);
                }
                Action::SetQty { product: p, qty } => {
                    let res = cart.set_quantity(&product(p), u32::from(qty));
                    if qty == 0 {
                        prop_assert_eq!(res, Err(StoreError::InvalidQuantity(0)));
                    } else if let Some(slot) = model.entry(active.clone()).or_default().get_mut(&product(p)) {
                        prop_assert_eq!(res, Ok(*slot != u32::from(qty)));
                        *slot = u32::from(qty);
                    } else {
                        prop_assert_eq!(res, Ok(false));
                    }
                }
                Action::Clear => {
                    let expected = model.entry(active.clone()).or_default().len();
                    prop_assert_eq!(cart.clear(), expected);
                    model.entry(active.clone()).or_default().clear();
                }
            }

            prop_assert_eq!(&observed(&cart), &model.get(&active).cloned().unwrap_or_default());
        }

        for user in 0u8..4 {
            let key = user_key(user);
            cart.set_active_user(key.clone());
            prop_assert_eq!(observed(&cart), model.get(&key).cloned().unwrap_or_default());
        }
    }

    #[test]
    fn merge_conserves_quantities_per_product(
        guest in prop::collection::vec((0u8..8, 1u8..5), 0..20),
        user in prop::collection::vec((0u8..8, 1u8..5), 0..20),
    ) {
        let mut cart = CartStore::new();
        let target = UserKey::new("U");
        let mut expected = BTreeMap::<String, u32>::new();

        cart.set_active_user(target.clone());
        for (p, qty) in &user {
            cart.upsert_line(draft(*p, *qty)).expect("upsert");
            *expected.entry(product(*p)).or_default() += u32::from(*qty);
        }
        cart.reset_to_guest();
        for (p, qty) in &guest {
            cart.upsert_line(draft(*p, *qty)).expect("upsert");
            *expected.entry(product(*p)).or_default() += u32::from(*qty);
        }
        let guest_lines = cart.lines().len();

        let outcome = cart.merge_into_user(target.clone()).expect("merge");
        prop_assert_eq!(outcome.moved, guest_lines);
        prop_assert_eq!(observed(&cart), expected);

        cart.reset_to_guest();
        prop_assert!(cart.lines().is_empty());
    }

    #[test]
    fn favorite_toggle_twice_restores_the_set(
        seed in prop::collection::vec(0u8..12, 0..12),
        id in 0u8..12,
    ) {
        let mut favs = FavoritesStore::new();
        for s in &seed {
            if !favs.contains(&product(*s)) {
                favs.toggle(&product(*s));
            }
        }
        let before = favs.ids().to_vec();

        favs.toggle(&product(id));
        favs.toggle(&product(id));

        let mut after = favs.ids().to_vec();
        let mut before_sorted = before.clone();
        after.sort();
        before_sorted.sort();
        prop_assert_eq!(after, before_sorted);
    }

    #[test]
    fn favorites_merge_is_a_duplicate_free_union(
        guest in prop::collection::btree_set(0u8..10, 0..10),
        user in prop::collection::btree_set(0u8..10, 0..10),
    ) {
        let mut favs = FavoritesStore::new();
        let target = UserKey::new("U");

        favs.set_active_user(target.clone());
        for id in &user {
            favs.toggle(&product(*id));
        }
        favs.reset_to_guest();
        for id in &guest {
            favs.toggle(&product(*id));
        }

        favs.merge_into_user(target).expect("merge");

        let mut ids = favs.ids().to_vec();
        ids.sort();
        let mut expected: Vec<String> = user.union(&guest).map(|id| product(*id)).collect();
        expected.sort();
        prop_assert_eq!(ids, expected);
    }
}
