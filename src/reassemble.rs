use sqleval_core::{EvalError, ExecutionOutcome, Result};

/// Puts pool outcomes, which arrive in completion order, back into sample order.
#[derive(Debug)]
pub struct Reassembler {
    slots: Vec<Option<ExecutionOutcome>>,
}

impl Reassembler {
    pub fn new(sample_count: usize) -> Self {
        Self {
            slots: vec![None; sample_count],
        }
    }

    pub fn insert(&mut self, outcome: ExecutionOutcome) -> Result<()> {
        let index = outcome.index;
        match self.slots.get_mut(index) {
            None => Err(EvalError::UnexpectedOutcome {
                index,
                reason: format!("only {} samples were submitted", self.slots.len()),
            }),
            Some(Some(_)) => Err(EvalError::UnexpectedOutcome {
                index,
                reason: "outcome reported twice".into(),
            }),
            Some(slot) => {
                *slot = Some(outcome);
                Ok(())
            }
        }
    }

    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = ExecutionOutcome>) -> Result<()> {
        outcomes.into_iter().try_for_each(|o| self.insert(o))
    }

    pub fn is_filled(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// The outcomes in index order, or every index that never reported.
    pub fn finish(self) -> Result<Vec<ExecutionOutcome>> {
        let missing: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .collect();
        if !missing.is_empty() {
            tracing::error!(?missing, "outcomes missing after the pool drained");
            return Err(EvalError::IncompleteResult { missing });
        }
        Ok(self.slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_restores_index_order() -> anyhow::Result<()> {
        let mut reassembler = Reassembler::new(4);
        reassembler.extend([3, 0, 2, 1].map(|i| ExecutionOutcome::correctness(i, i % 2 == 0)))?;
        let indices: Vec<usize> = reassembler.finish()?.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_missing_indices_are_reported() {
        let mut reassembler = Reassembler::new(3);
        reassembler
            .insert(ExecutionOutcome::correctness(1, true))
            .unwrap();
        match reassembler.finish() {
            Err(EvalError::IncompleteResult { missing }) => assert_eq!(missing, vec![0, 2]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_and_out_of_range_are_rejected() {
        let mut reassembler = Reassembler::new(2);
        reassembler
            .insert(ExecutionOutcome::correctness(0, true))
            .unwrap();
        assert!(matches!(
            reassembler.insert(ExecutionOutcome::correctness(0, false)),
            Err(EvalError::UnexpectedOutcome { index: 0, .. })
        ));
        assert!(matches!(
            reassembler.insert(ExecutionOutcome::correctness(5, false)),
            Err(EvalError::UnexpectedOutcome { index: 5, .. })
        ));
        assert!(reassembler.is_filled(0));
        assert!(!reassembler.is_filled(1));
    }
}
