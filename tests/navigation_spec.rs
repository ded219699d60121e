use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use course_tester::config::EngineConfig;
use course_tester::models::*;
use course_tester::sequencing::FixedClock;
use course_tester::{SequencingError, SequencingSession};
use speculate2::speculate;

fn leaf(id: &str) -> ActivityDescriptor {
    ActivityDescriptor::new(id, id.to_uppercase()).with_resource(format!("{}.html", id))
}

fn cluster(id: &str, children: Vec<ActivityDescriptor>) -> ActivityDescriptor {
    ActivityDescriptor::new(id, id.to_uppercase()).with_children(children)
}

fn configure(
    mut descriptor: ActivityDescriptor,
    f: impl FnOnce(&mut SequencingDefinition),
) -> ActivityDescriptor {
    f(&mut descriptor.sequencing);
    descriptor
}

fn always(action: RuleAction) -> SequencingRule {
    SequencingRule::new(action, vec![RuleCondition::new(ConditionKind::Always)])
}

fn session(course: &ActivityDescriptor) -> SequencingSession {
    SequencingSession::new(course).expect("Failed to load course")
}

fn linear_course() -> ActivityDescriptor {
    cluster("root", vec![leaf("a"), leaf("b"), leaf("c")])
}

fn complete(session: &mut SequencingSession, id: &str) {
    session
        .update_activity_progress(
            id,
            ActivityProgress {
                completed: Some(true),
                ..ActivityProgress::default()
            },
        )
        .expect("Failed to update progress");
}

fn current(session: &SequencingSession) -> Option<String> {
    session.current_activity().map(str::to_string)
}

fn is_not_available<T: std::fmt::Debug>(result: Result<T, SequencingError>) -> bool {
    matches!(result, Err(SequencingError::NavigationNotAvailable(_)))
}

speculate! {
    describe "start" {
        it "delivers the first leaf in document order" {
            let mut session = session(&linear_course());
            let target = session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(target.as_deref(), Some("a"));
            assert_eq!(session.session_state(), SessionState::Active);
            let a = session.tree().find("a").unwrap();
            assert_eq!(a.tracking.attempt_count, 1);
            assert!(a.tracking.attempt_active);
            assert!(session.tree().find("root").unwrap().tracking.attempt_active);
        }

        it "descends into nested clusters" {
            let course = cluster("root", vec![cluster("m1", vec![leaf("a"), leaf("b")]), leaf("c")]);
            let mut session = session(&course);

            assert_eq!(session.navigate(&NavigationRequest::Start).unwrap().as_deref(), Some("a"));
            assert!(session.tree().find("m1").unwrap().tracking.attempt_active);
        }

        it "delivers the root of a single-activity course" {
            let mut session = session(&leaf("only"));
            assert_eq!(session.navigate(&NavigationRequest::Start).unwrap().as_deref(), Some("only"));
        }

        it "is rejected once the session has started" {
            let mut session = session(&linear_course());
            session.navigate(&NavigationRequest::Start).unwrap();
            assert!(is_not_available(session.navigate(&NavigationRequest::Start)));
        }

        it "is rejected when the root does not allow flow" {
            let course = configure(linear_course(), |s| s.control_mode.flow = false);
            let mut session = session(&course);

            assert!(!session.available_navigation().start);
            assert!(is_not_available(session.navigate(&NavigationRequest::Start)));
            assert_eq!(session.session_state(), SessionState::NotStarted);
        }

        it "skips disabled and invisible subtrees" {
            let course = cluster("root", vec![
                configure(cluster("hidden", vec![leaf("h1")]), |s| s.visible = false),
                configure(leaf("off"), |s| {
                    s.sequencing_rules.pre_condition.push(always(RuleAction::Disabled))
                }),
                configure(leaf("skipped"), |s| {
                    s.sequencing_rules.pre_condition.push(always(RuleAction::Skip))
                }),
                leaf("first"),
            ]);
            let mut session = session(&course);

            assert_eq!(session.navigate(&NavigationRequest::Start).unwrap().as_deref(), Some("first"));
        }
    }

    describe "linear flow" {
        before {
            let mut session = session(&linear_course());
            session.navigate(&NavigationRequest::Start).unwrap();
        }

        it "walks the leaves with continue" {
            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("b"));
            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("c"));

            let a = session.tree().find("a").unwrap();
            assert!(!a.tracking.attempt_active);
            assert_eq!(a.tracking.attempt_count, 1);
        }

        it "rejects continue at the end without changing anything" {
            session.navigate(&NavigationRequest::Continue).unwrap();
            session.navigate(&NavigationRequest::Continue).unwrap();
            let before = session.get_sequencing_state();

            assert!(!session.available_navigation().continue_);
            assert!(is_not_available(session.navigate(&NavigationRequest::Continue)));
            assert_eq!(session.get_sequencing_state(), before);
            assert!(session.tree().find("c").unwrap().tracking.attempt_active);
        }

        it "never offers previous right after start" {
            assert!(!session.available_navigation().previous);
            assert!(is_not_available(session.navigate(&NavigationRequest::Previous)));
        }

        it "goes back with previous" {
            session.navigate(&NavigationRequest::Continue).unwrap();
            assert!(session.available_navigation().previous);
            assert_eq!(session.navigate(&NavigationRequest::Previous).unwrap().as_deref(), Some("a"));
            assert_eq!(session.tree().find("a").unwrap().tracking.attempt_count, 2);
        }

        it "completes the root once every leaf is completed" {
            complete(&mut session, "a");
            session.navigate(&NavigationRequest::Continue).unwrap();
            complete(&mut session, "b");
            session.navigate(&NavigationRequest::Continue).unwrap();
            assert_ne!(session.get_sequencing_state().root_completion, CompletionStatus::Completed);

            complete(&mut session, "c");
            assert_eq!(session.get_sequencing_state().root_completion, CompletionStatus::Completed);
        }

        it "returns identical snapshots when nothing happened in between" {
            let first = session.get_sequencing_state();
            let second = session.get_sequencing_state();
            assert_eq!(first, second);
        }

        it "moves to the same leaf as start after retryAll and continue" {
            session.navigate(&NavigationRequest::Continue).unwrap();
            complete(&mut session, "a");

            assert_eq!(session.navigate(&NavigationRequest::RetryAll).unwrap().as_deref(), Some("root"));
            assert_eq!(session.tree().find("a").unwrap().tracking.completion_status, CompletionStatus::NotAttempted);
            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("a"));
        }
    }

    describe "flow restrictions" {
        it "refuses previous below a forward-only cluster" {
            let course = configure(linear_course(), |s| s.control_mode.forward_only = true);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();
            session.navigate(&NavigationRequest::Continue).unwrap();

            assert!(!session.available_navigation().previous);
            assert!(is_not_available(session.navigate(&NavigationRequest::Previous)));
            assert_eq!(current(&session).as_deref(), Some("b"));
        }

        it "stops forward traversal out of a cluster that forbids it" {
            let course = cluster("root", vec![
                configure(cluster("m1", vec![leaf("a"), leaf("b")]), |s| {
                    s.sequencing_rules.pre_condition.push(always(RuleAction::StopForwardTraversal))
                }),
                leaf("c"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("b"));
            assert!(is_not_available(session.navigate(&NavigationRequest::Continue)));
        }

        it "continues past a disabled cluster and an invisible leaf" {
            let course = cluster("root", vec![
                leaf("a"),
                configure(cluster("m", vec![leaf("b"), leaf("c")]), |s| {
                    s.sequencing_rules.pre_condition.push(always(RuleAction::Disabled))
                }),
                configure(leaf("d"), |s| s.visible = false),
                leaf("e"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("e"));
            for id in ["b", "c", "d"] {
                assert_eq!(session.tree().find(id).unwrap().tracking.attempt_count, 0);
            }
        }

        it "skips leaves outside their available time window" {
            let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            let clock = Arc::new(FixedClock::new(noon));
            let course = cluster("root", vec![
                leaf("a"),
                configure(leaf("later"), |s| {
                    s.limit_conditions.begin_time_limit = Some(noon + Duration::hours(1))
                }),
                leaf("c"),
            ]);
            let mut session =
                SequencingSession::with_config(&course, EngineConfig::default(), clock.clone()).unwrap();
            session.navigate(&NavigationRequest::Start).unwrap();
            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("c"));

            clock.advance(Duration::hours(2));
            assert_eq!(session.navigate(&NavigationRequest::Previous).unwrap().as_deref(), Some("later"));
        }

        it "ignores limits when enforcement is disabled" {
            let course = cluster("root", vec![
                configure(leaf("a"), |s| s.limit_conditions.attempt_limit = Some(1)),
                leaf("b"),
            ]);
            let config = EngineConfig {
                enforce_limit_conditions: false,
                ..EngineConfig::default()
            };
            let clock = Arc::new(FixedClock::new(Utc::now()));
            let mut session = SequencingSession::with_config(&course, config, clock).unwrap();
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(session.navigate(&NavigationRequest::Retry).unwrap().as_deref(), Some("a"));
            assert_eq!(session.tree().find("a").unwrap().tracking.attempt_count, 2);
        }
    }

    describe "choice" {
        it "delivers a chosen leaf before the session starts" {
            let mut session = session(&linear_course());
            assert_eq!(
                session.available_navigation().choice_targets,
                vec!["root".to_string(), "a".to_string(), "b".to_string(), "c".to_string()]
            );
            assert_eq!(
                session.navigate(&NavigationRequest::Choice { target: "b".into() }).unwrap().as_deref(),
                Some("b")
            );
            assert_eq!(session.session_state(), SessionState::Active);
        }

        it "ends the attempt being left" {
            let mut session = session(&linear_course());
            session.navigate(&NavigationRequest::Start).unwrap();
            session.navigate(&NavigationRequest::Choice { target: "c".into() }).unwrap();

            assert!(!session.tree().find("a").unwrap().tracking.attempt_active);
            assert!(session.tree().find("c").unwrap().tracking.attempt_active);
            assert!(!session.available_navigation().choice_targets.contains(&"c".to_string()));
        }

        it "enters the first deliverable leaf of a chosen cluster" {
            let course = cluster("root", vec![leaf("a"), cluster("m1", vec![leaf("b"), leaf("c")])]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(
                session.navigate(&NavigationRequest::Choice { target: "m1".into() }).unwrap().as_deref(),
                Some("b")
            );
        }

        it "is blocked by an ancestor that disables choice" {
            let course = cluster("root", vec![
                configure(cluster("m1", vec![leaf("a"), leaf("b")]), |s| s.control_mode.choice = false),
                leaf("c"),
            ]);
            let mut session = session(&course);

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "b".into() })));
            let targets = &session.available_navigation().choice_targets;
            assert!(!targets.contains(&"a".to_string()));
            assert!(!targets.contains(&"b".to_string()));
            assert!(targets.contains(&"c".to_string()));
        }

        it "rejects a target with a disabled precondition" {
            let course = cluster("root", vec![
                leaf("a"),
                configure(leaf("locked"), |s| {
                    s.sequencing_rules.pre_condition.push(always(RuleAction::Disabled))
                }),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "locked".into() })));
            assert_eq!(current(&session).as_deref(), Some("a"));
            assert_eq!(session.tree().find("locked").unwrap().tracking.attempt_count, 0);
        }

        it "passes over the exhausted current leaf when choosing its cluster" {
            let course = cluster("root", vec![
                cluster("m1", vec![
                    configure(leaf("quiz"), |s| s.limit_conditions.attempt_limit = Some(1)),
                    leaf("x"),
                ]),
                leaf("summary"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();
            session
                .update_activity_progress("quiz", ActivityProgress {
                    satisfied: Some(false),
                    ..ActivityProgress::default()
                })
                .unwrap();

            assert_eq!(
                session.navigate(&NavigationRequest::Choice { target: "m1".into() }).unwrap().as_deref(),
                Some("x")
            );
            let quiz = session.tree().find("quiz").unwrap();
            assert_eq!(quiz.tracking.attempt_count, 1);
            assert!(!quiz.tracking.attempt_active);
        }

        it "rejects a cluster whose only leaf is exhausted" {
            let course = cluster("root", vec![
                cluster("m1", vec![configure(leaf("quiz"), |s| s.limit_conditions.attempt_limit = Some(1))]),
                leaf("summary"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "m1".into() })));
            assert_eq!(current(&session).as_deref(), Some("quiz"));
            assert_eq!(session.tree().find("quiz").unwrap().tracking.attempt_count, 1);
        }

        it "rejects an unknown target" {
            let mut session = session(&linear_course());
            assert_eq!(
                session.navigate(&NavigationRequest::Choice { target: "nope".into() }),
                Err(SequencingError::UnknownActivity("nope".to_string()))
            );
        }

        it "hides activities with a hiddenFromChoice rule" {
            let course = cluster("root", vec![
                leaf("a"),
                configure(leaf("secret"), |s| {
                    s.sequencing_rules.pre_condition.push(always(RuleAction::HiddenFromChoice))
                }),
            ]);
            let mut session = session(&course);

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "secret".into() })));
            session.navigate(&NavigationRequest::Start).unwrap();
            // Hidden from choice, not from flow.
            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("secret"));
        }

        it "does not leave a cluster whose choiceExit is off" {
            let course = cluster("root", vec![
                configure(cluster("m1", vec![leaf("a"), leaf("b")]), |s| s.control_mode.choice_exit = false),
                leaf("c"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Choice { target: "a".into() }).unwrap();

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "c".into() })));
            assert_eq!(
                session.navigate(&NavigationRequest::Choice { target: "b".into() }).unwrap().as_deref(),
                Some("b")
            );
        }

        it "only allows neighbouring branches under constrainChoice" {
            let course = configure(
                cluster("root", vec![leaf("a"), leaf("b"), leaf("c")]),
                |s| s.control_mode.constrain_choice = true,
            );
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "c".into() })));
            assert_eq!(
                session.navigate(&NavigationRequest::Choice { target: "b".into() }).unwrap().as_deref(),
                Some("b")
            );
            assert_eq!(
                session.navigate(&NavigationRequest::Choice { target: "c".into() }).unwrap().as_deref(),
                Some("c")
            );
        }

        it "refuses backward targets under a forward-only common ancestor" {
            let course = configure(linear_course(), |s| s.control_mode.forward_only = true);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();
            session.navigate(&NavigationRequest::Continue).unwrap();

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "a".into() })));
            assert!(session.navigate(&NavigationRequest::Choice { target: "c".into() }).is_ok());
        }

        it "cannot activate children of a cluster that prevents activation" {
            let course = cluster("root", vec![
                configure(cluster("m1", vec![leaf("a")]), |s| s.control_mode.prevent_activation = true),
                leaf("b"),
            ]);
            let mut session = session(&course);

            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "a".into() })));
            session.navigate(&NavigationRequest::Start).unwrap();
            assert_eq!(current(&session).as_deref(), Some("a"));
        }
    }

    describe "attempt limits" {
        before {
            let course = cluster("root", vec![
                configure(leaf("quiz"), |s| s.limit_conditions.attempt_limit = Some(1)),
                leaf("summary"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();
            session
                .update_activity_progress("quiz", ActivityProgress {
                    satisfied: Some(false),
                    ..ActivityProgress::default()
                })
                .unwrap();
        }

        it "rejects retry and choice once the limit is reached" {
            let before = session.get_sequencing_state();

            assert!(is_not_available(session.navigate(&NavigationRequest::Retry)));
            assert_eq!(session.get_sequencing_state(), before);
            assert!(is_not_available(session.navigate(&NavigationRequest::Choice { target: "quiz".into() })));
            assert_eq!(session.tree().find("quiz").unwrap().tracking.attempt_count, 1);
        }

        it "still lets the learner move on" {
            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("summary"));
            assert!(!session.available_navigation().previous);
        }
    }

    describe "retry" {
        it "resets the leaf and starts a new attempt" {
            let mut session = session(&linear_course());
            session.navigate(&NavigationRequest::Start).unwrap();
            complete(&mut session, "a");

            assert_eq!(session.navigate(&NavigationRequest::Retry).unwrap().as_deref(), Some("a"));
            let a = session.tree().find("a").unwrap();
            assert_eq!(a.tracking.attempt_count, 2);
            assert_eq!(a.tracking.completion_status, CompletionStatus::NotAttempted);
            assert!(a.tracking.attempt_active);
        }
    }

    describe "rules during termination" {
        it "follows a continue post-condition on exit" {
            let course = cluster("root", vec![
                configure(leaf("a"), |s| {
                    s.sequencing_rules.post_condition.push(SequencingRule::new(
                        RuleAction::Continue,
                        vec![RuleCondition::new(ConditionKind::Completed)],
                    ))
                }),
                leaf("b"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();
            complete(&mut session, "a");

            assert_eq!(session.navigate(&NavigationRequest::Exit).unwrap().as_deref(), Some("b"));
        }

        it "climbs out of the cluster on exitParent" {
            let course = cluster("root", vec![
                cluster("m1", vec![
                    configure(leaf("a"), |s| s.sequencing_rules.post_condition.push(always(RuleAction::ExitParent))),
                    leaf("b"),
                ]),
                leaf("c"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap().as_deref(), Some("c"));
            assert!(!session.tree().find("m1").unwrap().tracking.attempt_active);
            assert_eq!(session.tree().find("b").unwrap().tracking.attempt_count, 0);
        }

        it "ends the session on an exitAll exit rule" {
            let course = cluster("root", vec![
                configure(cluster("m1", vec![leaf("a"), leaf("b")]), |s| {
                    s.sequencing_rules.exit.push(always(RuleAction::ExitAll))
                }),
                leaf("c"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(session.navigate(&NavigationRequest::Continue).unwrap(), None);
            assert_eq!(session.session_state(), SessionState::Ended);
        }

        it "retries on a failed post-condition until the limit is reached" {
            let course = cluster("root", vec![
                configure(leaf("quiz"), |s| {
                    s.limit_conditions.attempt_limit = Some(2);
                    s.sequencing_rules.post_condition.push(SequencingRule::new(
                        RuleAction::Retry,
                        vec![RuleCondition::not(ConditionKind::Satisfied)],
                    ));
                }),
                leaf("next"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();
            let fail = ActivityProgress {
                satisfied: Some(false),
                ..ActivityProgress::default()
            };

            session.update_activity_progress("quiz", fail.clone()).unwrap();
            assert_eq!(session.navigate(&NavigationRequest::Exit).unwrap().as_deref(), Some("quiz"));
            assert_eq!(session.tree().find("quiz").unwrap().tracking.attempt_count, 2);

            session.update_activity_progress("quiz", fail).unwrap();
            session.navigate(&NavigationRequest::Exit).unwrap();
            let quiz = session.tree().find("quiz").unwrap();
            assert_eq!(quiz.tracking.attempt_count, 2);
            assert!(!quiz.tracking.attempt_active);
        }
    }

    describe "exit" {
        it "ends the session when the root is exited" {
            let mut session = session(&linear_course());
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(session.navigate(&NavigationRequest::Exit).unwrap().as_deref(), Some("a"));
            assert_eq!(session.session_state(), SessionState::Active);
            assert!(session.available_navigation().continue_);

            assert_eq!(session.navigate(&NavigationRequest::Exit).unwrap(), None);
            assert_eq!(session.session_state(), SessionState::Ended);
            assert_eq!(session.available_navigation(), &AvailableNavigation::default());
        }

        it "ends everything on exitAll" {
            let mut session = session(&linear_course());
            session.navigate(&NavigationRequest::Start).unwrap();
            complete(&mut session, "a");

            assert_eq!(session.navigate(&NavigationRequest::ExitAll).unwrap(), None);
            assert_eq!(session.session_state(), SessionState::Ended);
            assert!(session.tree().activities().all(|a| !a.tracking.attempt_active));
            assert!(is_not_available(session.navigate(&NavigationRequest::Start)));
        }

        it "abandons without evaluating rules" {
            let course = cluster("root", vec![
                configure(leaf("a"), |s| s.sequencing_rules.post_condition.push(always(RuleAction::ExitAll))),
                leaf("b"),
            ]);
            let mut session = session(&course);
            session.navigate(&NavigationRequest::Start).unwrap();

            assert_eq!(session.navigate(&NavigationRequest::Abandon).unwrap().as_deref(), Some("a"));
            assert_eq!(session.session_state(), SessionState::Active);
            assert_eq!(session.navigate(&NavigationRequest::AbandonAll).unwrap(), None);
            assert_eq!(session.session_state(), SessionState::Ended);
        }
    }

    describe "suspend and resume" {
        before {
            let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            let clock = Arc::new(FixedClock::new(noon));
            let mut session =
                SequencingSession::with_config(&linear_course(), EngineConfig::default(), clock.clone()).unwrap();
            session.navigate(&NavigationRequest::Start).unwrap();
            session.navigate(&NavigationRequest::Continue).unwrap();
            clock.advance(Duration::seconds(90));
        }

        it "records a bookmark and pauses the attempt" {
            assert_eq!(session.navigate(&NavigationRequest::SuspendAll).unwrap().as_deref(), Some("b"));

            let snapshot = session.get_sequencing_state();
            assert_eq!(snapshot.session_state, SessionState::Suspended);
            assert_eq!(snapshot.suspended_activity.as_deref(), Some("b"));
            assert!(snapshot.available_navigation.resume_all);
            assert!(!snapshot.available_navigation.continue_);
            assert!(!snapshot.available_navigation.choice);

            let b = session.tree().find("b").unwrap();
            assert!(b.tracking.suspended);
            assert_eq!(b.tracking.attempt_duration, 90.0);
        }

        it "resumes at the bookmark without a new attempt" {
            session.navigate(&NavigationRequest::SuspendAll).unwrap();
            clock.advance(Duration::hours(1));

            assert_eq!(session.navigate(&NavigationRequest::ResumeAll).unwrap().as_deref(), Some("b"));
            let b = session.tree().find("b").unwrap();
            assert_eq!(b.tracking.attempt_count, 1);
            assert!(!b.tracking.suspended);
            assert_eq!(session.get_sequencing_state().suspended_activity, None);

            clock.advance(Duration::seconds(10));
            session.navigate(&NavigationRequest::Continue).unwrap();
            assert_eq!(session.tree().find("b").unwrap().tracking.attempt_duration, 100.0);
        }

        it "rejects resumeAll on a session that is not suspended" {
            assert!(is_not_available(session.navigate(&NavigationRequest::ResumeAll)));
        }

        it "suspends through a content exit" {
            assert_eq!(
                session.handle_activity_exit("b", ExitMode::Suspend).unwrap().as_deref(),
                Some("b")
            );
            assert_eq!(session.session_state(), SessionState::Suspended);
        }
    }
}
