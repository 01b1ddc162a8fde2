//! Coordinator 的 prompt 构建

use crate::coordinator::inbox::Inbox;

pub fn system_prompt(inbox: &Inbox, insight_count: usize, iteration: u64) -> String {
    format!(
        "You are the coordinator of a set of subsystem monitors. Monitors send you notifications \
         about anomalies they observed; your job is to triage them and correlate related ones into insights.\n\n\
         ## Status\n\
         Inbox: {total} notification(s), {unread} unread. Insights produced so far: {insights}. Iteration: {iteration}.\n\n\
         ## Rules\n\
         - Choose exactly one action per turn.\n\
         - Start with `get_notifications` to read the inbox.\n\
         - Acknowledge notifications you have looked at; statuses only move forward (unread -> acknowledged -> resolved).\n\
         - When notifications from different monitors share a cause, a time window or a symptom, \
           record it with `produce_insight`; the referenced notifications are resolved.\n\
         - Call `done` when nothing unread remains to triage.",
        total = inbox.len(),
        unread = inbox.unread_count(),
        insights = insight_count,
        iteration = iteration,
    )
}

/// 每一轮分析的第一条输入
pub fn kickoff(inbox: &Inbox) -> String {
    format!(
        "New triage pass. {} unread notification(s) are waiting in the inbox.",
        inbox.unread_count()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_reports_inbox_counts() {
        let inbox = Inbox::new();
        let prompt = system_prompt(&inbox, 2, 5);
        assert!(prompt.contains("0 notification(s), 0 unread"));
        assert!(prompt.contains("Insights produced so far: 2"));
        assert!(kickoff(&inbox).contains("0 unread"));
    }
}
