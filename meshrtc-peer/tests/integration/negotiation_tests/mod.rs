mod test_answer_guard;
mod test_candidate_ordering;
mod test_end_to_end;
