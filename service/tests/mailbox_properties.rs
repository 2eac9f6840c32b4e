//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Property tests for mailbox drain order

use linerelay_service::{ClientIdentity, DrainOrder, Mailbox};
use proptest::prelude::*;

fn drain(mailbox: &Mailbox) -> Vec<String> {
    std::iter::from_fn(|| mailbox.take_one()).collect()
}

fn identity() -> ClientIdentity {
    "alice".parse().unwrap()
}

proptest! {
    #[test]
    fn lifo_drains_in_reverse(payloads in prop::collection::vec(".*", 0..64)) {
        let mailbox = Mailbox::new(identity(), DrainOrder::Lifo, None);
        for payload in &payloads {
            mailbox.append(payload.clone()).unwrap();
        }

        let mut expected = payloads.clone();
        expected.reverse();
        prop_assert_eq!(drain(&mailbox), expected);
        prop_assert!(mailbox.is_empty());
    }

    #[test]
    fn fifo_drains_in_order(payloads in prop::collection::vec(".*", 0..64)) {
        let mailbox = Mailbox::new(identity(), DrainOrder::Fifo, None);
        for payload in &payloads {
            mailbox.append(payload.clone()).unwrap();
        }

        prop_assert_eq!(drain(&mailbox), payloads);
    }

    #[test]
    fn capacity_is_never_exceeded(capacity in 1usize..32, count in 0usize..64) {
        let mailbox = Mailbox::new(identity(), DrainOrder::Lifo, Some(capacity));
        let accepted = (0..count)
            .filter(|n| mailbox.append(n.to_string()).is_ok())
            .count();

        prop_assert_eq!(accepted, count.min(capacity));
        prop_assert_eq!(mailbox.len(), count.min(capacity));
    }
}
