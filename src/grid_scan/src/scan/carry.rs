//! Carry propagation into a scanned block.

use crate::runtime::WorkGroup;

/// Add `carry` to every element of `block`, two elements per work item.
pub fn add_carry_group(group: &WorkGroup, carry: u32, block: &mut [u32]) {
    let len = block.len();
    group.for_each_item(|lid| {
        for i in [2 * lid, 2 * lid + 1] {
            if i < len {
                block[i] = block[i].wrapping_add(carry);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_carry() {
        let group = WorkGroup::new(0, 2);
        let mut block = vec![0, 1, 2, 3];
        add_carry_group(&group, 10, &mut block);
        assert_eq!(block, vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_zero_carry_is_identity() {
        let group = WorkGroup::new(1, 4);
        let mut block = vec![5, 6, 7, 8, 9, 10, 11, 12];
        add_carry_group(&group, 0, &mut block);
        assert_eq!(block, vec![5, 6, 7, 8, 9, 10, 11, 12]);
    }
}
